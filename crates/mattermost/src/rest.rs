use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use meetmatter_core::{Channel, Message, User};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::api::{ApiError, ChatApi, NewPost, NewReaction, PageRequest};

/// `ChatApi` over the Mattermost REST API v4.
pub struct RestClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

#[derive(Debug, Default, Deserialize)]
struct PostList {
    #[serde(default)]
    order: Option<Vec<String>>,
    #[serde(default)]
    posts: Option<HashMap<String, Message>>,
}

impl PostList {
    /// Posts in the server's `order`, dropping ids missing from the map.
    fn into_ordered(self) -> Vec<Message> {
        let mut posts = self.posts.unwrap_or_default();
        self.order.unwrap_or_default().iter().filter_map(|id| posts.remove(id)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl RestClient {
    pub fn new(
        server_url: &str,
        token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        Ok(Self { http, base_url: server_url.trim_end_matches('/').to_owned(), token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.expose_secret())
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        debug!(method = "GET", path, "mattermost api request");
        let response = self
            .authorized(self.http.get(self.url(path)).query(query))
            .send()
            .await
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        decode_json(check_status(response).await?).await
    }

    async fn post_json<B>(&self, path: &str, body: &B) -> Result<Response, ApiError>
    where
        B: serde::Serialize + ?Sized,
    {
        debug!(method = "POST", path, "mattermost api request");
        let response = self
            .authorized(self.http.post(self.url(path)).json(body))
            .send()
            .await
            .map_err(|error| ApiError::Transport(error.to_string()))?;

        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_owned());

    Err(ApiError::Status { status: status.as_u16(), message })
}

async fn decode_json<T>(response: Response) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let raw = response.text().await.map_err(|error| ApiError::Transport(error.to_string()))?;
    serde_json::from_str(&raw).map_err(|error| ApiError::Decode(error.to_string()))
}

#[async_trait]
impl ChatApi for RestClient {
    async fn me(&self) -> Result<User, ApiError> {
        self.get_json("/users/me", &[]).await
    }

    async fn user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get_json(&format!("/users/{user_id}"), &[]).await
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, ApiError> {
        self.get_json(&format!("/channels/{channel_id}"), &[]).await
    }

    async fn channel_posts(
        &self,
        channel_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Message>, ApiError> {
        let mut query = vec![("per_page", page.per_page.to_string())];
        if let Some(before) = &page.before {
            query.push(("before", before.clone()));
        }

        let list: PostList =
            self.get_json(&format!("/channels/{channel_id}/posts"), &query).await?;
        Ok(list.into_ordered())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Message, ApiError> {
        let response = self.post_json("/posts", post).await?;
        decode_json(response).await
    }

    async fn save_reaction(&self, reaction: &NewReaction) -> Result<(), ApiError> {
        self.post_json("/reactions", reaction).await.map(|_| ())
    }
}
