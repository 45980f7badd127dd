use meetmatter_core::{BotError, Message};
use meetmatter_mattermost::api::{ChatApi, PageRequest};
use tracing::debug;

use crate::commands::is_topic_marker;

/// Walks a channel's recent history and keeps the open topics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicCollector {
    page_size: u32,
    max_pages: u32,
}

impl Default for TopicCollector {
    fn default() -> Self {
        Self { page_size: 100, max_pages: 1 }
    }
}

impl TopicCollector {
    pub fn new(page_size: u32, max_pages: u32) -> Self {
        Self { page_size: page_size.max(1), max_pages: max_pages.max(1) }
    }

    /// Open topics in the order the server returned them, newest first.
    pub async fn list_open_topics(
        &self,
        api: &dyn ChatApi,
        channel_id: &str,
        bot_user_id: &str,
    ) -> Result<Vec<Message>, BotError> {
        let mut topics = Vec::new();
        let mut before: Option<String> = None;

        for page_index in 0..self.max_pages {
            let page = PageRequest { per_page: self.page_size, before: before.take() };
            let posts = api.channel_posts(channel_id, &page).await.map_err(|error| {
                BotError::fetch(format!("posts of channel {channel_id}"), error)
            })?;

            let fetched = posts.len();
            debug!(channel_id, page_index, fetched, "scanned channel history page");
            before = posts.last().map(|post| post.id.clone());
            topics.extend(posts.into_iter().filter(|post| is_open_topic(post, bot_user_id)));

            if fetched < self.page_size as usize {
                break;
            }
        }

        Ok(topics)
    }
}

pub fn is_open_topic(message: &Message, bot_user_id: &str) -> bool {
    is_topic_marker(&message.hashtags)
        && message.author_id != bot_user_id
        && !message.is_completed()
}
