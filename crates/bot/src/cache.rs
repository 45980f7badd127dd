use std::collections::HashMap;
use std::future::Future;

use meetmatter_core::{BotError, CacheFailurePolicy, Channel, User};
use meetmatter_mattermost::api::{ApiError, ChatApi};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Session-scoped user and channel lookups. Entries are never evicted;
/// `clear` drops everything when a new WebSocket session starts.
pub struct EntityCache {
    policy: CacheFailurePolicy,
    users: Mutex<HashMap<String, User>>,
    channels: Mutex<HashMap<String, Channel>>,
}

impl EntityCache {
    pub fn new(policy: CacheFailurePolicy) -> Self {
        Self { policy, users: Mutex::new(HashMap::new()), channels: Mutex::new(HashMap::new()) }
    }

    pub async fn user(&self, api: &dyn ChatApi, user_id: &str) -> Result<User, BotError> {
        lookup(&self.users, self.policy, "user", user_id, api.user(user_id), || {
            User::unresolved(user_id)
        })
        .await
    }

    pub async fn channel(&self, api: &dyn ChatApi, channel_id: &str) -> Result<Channel, BotError> {
        lookup(&self.channels, self.policy, "channel", channel_id, api.channel(channel_id), || {
            Channel::unresolved(channel_id)
        })
        .await
    }

    pub async fn clear(&self) {
        self.users.lock().await.clear();
        self.channels.lock().await.clear();
    }

    pub async fn cached_users(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn cached_channels(&self) -> usize {
        self.channels.lock().await.len()
    }
}

async fn lookup<T, F>(
    entries: &Mutex<HashMap<String, T>>,
    policy: CacheFailurePolicy,
    kind: &str,
    id: &str,
    fetch: F,
    placeholder: impl FnOnce() -> T,
) -> Result<T, BotError>
where
    T: Clone,
    F: Future<Output = Result<T, ApiError>>,
{
    if let Some(entry) = entries.lock().await.get(id) {
        return Ok(entry.clone());
    }

    debug!(kind, id, "entity cache miss");
    let entity = match fetch.await {
        Ok(entity) => entity,
        Err(api_error) => match policy {
            CacheFailurePolicy::Retry => {
                return Err(BotError::fetch(format!("{kind} {id}"), api_error));
            }
            CacheFailurePolicy::CacheFallback => {
                warn!(kind, id, error = %api_error, "lookup failed; caching placeholder");
                placeholder()
            }
        },
    };

    entries.lock().await.insert(id.to_owned(), entity.clone());
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use meetmatter_core::{BotError, CacheFailurePolicy, Channel, ChannelKind, Message, User};
    use meetmatter_mattermost::api::{ApiError, ChatApi, NewPost, NewReaction, PageRequest};

    use super::EntityCache;

    #[derive(Default)]
    struct LookupApi {
        fail: bool,
        user_fetches: AtomicUsize,
        channel_fetches: AtomicUsize,
    }

    impl LookupApi {
        fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        fn outcome<T>(&self, value: T) -> Result<T, ApiError> {
            if self.fail {
                Err(ApiError::Status { status: 404, message: "not found".to_owned() })
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl ChatApi for LookupApi {
        async fn me(&self) -> Result<User, ApiError> {
            self.outcome(User::unresolved("bot"))
        }

        async fn user(&self, user_id: &str) -> Result<User, ApiError> {
            self.user_fetches.fetch_add(1, Ordering::SeqCst);
            self.outcome(User {
                id: user_id.to_owned(),
                username: "alice".to_owned(),
                display_name: "Alice".to_owned(),
            })
        }

        async fn channel(&self, channel_id: &str) -> Result<Channel, ApiError> {
            self.channel_fetches.fetch_add(1, Ordering::SeqCst);
            self.outcome(Channel {
                id: channel_id.to_owned(),
                kind: ChannelKind::Group,
                display_name: String::new(),
            })
        }

        async fn channel_posts(
            &self,
            _channel_id: &str,
            _page: &PageRequest,
        ) -> Result<Vec<Message>, ApiError> {
            Ok(Vec::new())
        }

        async fn create_post(&self, _post: &NewPost) -> Result<Message, ApiError> {
            Ok(Message::default())
        }

        async fn save_reaction(&self, _reaction: &NewReaction) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let api = LookupApi::default();
        let cache = EntityCache::new(CacheFailurePolicy::Retry);

        let first = cache.channel(&api, "c1").await.expect("channel");
        let second = cache.channel(&api, "c1").await.expect("channel");
        cache.user(&api, "u1").await.expect("user");
        cache.user(&api, "u1").await.expect("user");

        assert_eq!(first, second);
        assert_eq!(api.channel_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(api.user_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_channels().await, 1);
        assert_eq!(cache.cached_users().await, 1);
    }

    #[tokio::test]
    async fn retry_policy_does_not_cache_failures() {
        let api = LookupApi::failing();
        let cache = EntityCache::new(CacheFailurePolicy::Retry);

        let error = cache.channel(&api, "c1").await.expect_err("fetch should fail");
        assert!(matches!(error, BotError::Fetch { ref resource, .. } if resource == "channel c1"));
        assert!(cache.channel(&api, "c1").await.is_err());

        assert_eq!(api.channel_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.cached_channels().await, 0);
    }

    #[tokio::test]
    async fn fallback_policy_caches_placeholder() {
        let api = LookupApi::failing();
        let cache = EntityCache::new(CacheFailurePolicy::CacheFallback);

        let channel = cache.channel(&api, "c1").await.expect("placeholder channel");
        let again = cache.channel(&api, "c1").await.expect("placeholder channel");
        let user = cache.user(&api, "u1").await.expect("placeholder user");

        assert_eq!(channel.kind, ChannelKind::Other);
        assert_eq!(channel, again);
        assert_eq!(user, User::unresolved("u1"));
        assert_eq!(api.channel_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_forces_fresh_lookups() {
        let api = LookupApi::default();
        let cache = EntityCache::new(CacheFailurePolicy::Retry);

        cache.channel(&api, "c1").await.expect("channel");
        cache.clear().await;
        cache.channel(&api, "c1").await.expect("channel");

        assert_eq!(api.channel_fetches.load(Ordering::SeqCst), 2);
    }
}
