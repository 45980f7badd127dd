use async_trait::async_trait;
use meetmatter_core::{Channel, Message, User};
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub channel_id: String,
    pub root_id: String,
    pub parent_id: String,
    pub message: String,
}

impl NewPost {
    /// A reply threaded under `parent`.
    pub fn reply_to(parent: &Message, message: impl Into<String>) -> Self {
        Self {
            channel_id: parent.channel_id.clone(),
            root_id: parent.id.clone(),
            parent_id: parent.id.clone(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewReaction {
    pub user_id: String,
    pub post_id: String,
    pub emoji_name: String,
}

/// One page of channel history, newest first. `before` is the id of the
/// oldest post of the previous page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub per_page: u32,
    pub before: Option<String>,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn me(&self) -> Result<User, ApiError>;
    async fn user(&self, user_id: &str) -> Result<User, ApiError>;
    async fn channel(&self, channel_id: &str) -> Result<Channel, ApiError>;
    async fn channel_posts(
        &self,
        channel_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Message>, ApiError>;
    async fn create_post(&self, post: &NewPost) -> Result<Message, ApiError>;
    async fn save_reaction(&self, reaction: &NewReaction) -> Result<(), ApiError>;
}
