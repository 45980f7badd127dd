use std::sync::Arc;

use async_trait::async_trait;
use meetmatter_core::text::strip_hashtags;
use meetmatter_core::{BotError, ChannelKind, Message, User};
use meetmatter_mattermost::api::{ChatApi, NewPost, NewReaction};
use meetmatter_mattermost::events::{
    EventContext, EventEnvelope, EventHandler, EventHandlerError, HandlerResult, ServerEvent,
    ServerEventType,
};
use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::commands::{
    classify_hashtags, emoji, parse_direct_command, parse_group_command, DirectCommand,
    GroupCommand, HELP_TEXT,
};
use crate::topics::TopicCollector;

/// Handles `posted` events: classifies each message by channel kind and
/// content, then issues the matching reactions and replies.
pub struct CommandDispatcher {
    api: Arc<dyn ChatApi>,
    bot: User,
    cache: EntityCache,
    topics: TopicCollector,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn ChatApi>,
        bot: User,
        cache: EntityCache,
        topics: TopicCollector,
    ) -> Self {
        Self { api, bot, cache, topics }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub async fn handle_message(
        &self,
        message: &Message,
        ctx: &EventContext,
    ) -> Result<HandlerResult, BotError> {
        if message.author_id == self.bot.id {
            return Ok(HandlerResult::Ignored);
        }

        let channel = self.cache.channel(self.api.as_ref(), &message.channel_id).await?;
        if channel.kind == ChannelKind::Other {
            return Ok(HandlerResult::Ignored);
        }

        let author = match self.cache.user(self.api.as_ref(), &message.author_id).await {
            Ok(user) => user.display_name,
            Err(error) => {
                debug!(error = %error, "author lookup failed");
                message.author_id.clone()
            }
        };
        debug!(
            correlation_id = %ctx.correlation_id,
            channel_id = %channel.id,
            channel_kind = ?channel.kind,
            post_id = %message.id,
            author = %author,
            "classifying posted message"
        );

        let actions = match channel.kind {
            ChannelKind::Direct => self.handle_direct(message).await?,
            ChannelKind::Group => self.handle_group(message).await?,
            ChannelKind::Other => return Ok(HandlerResult::Ignored),
        };

        if actions == 0 {
            return Ok(HandlerResult::Ignored);
        }

        info!(
            event_name = "bot.command.processed",
            correlation_id = %ctx.correlation_id,
            post_id = %message.id,
            actions,
            "posted message handled"
        );
        Ok(HandlerResult::Processed { actions })
    }

    async fn handle_direct(&self, message: &Message) -> Result<usize, BotError> {
        match parse_direct_command(&message.body) {
            Some(DirectCommand::Ping) => {
                self.react(&message.id, emoji::PING).await?;
                Ok(1)
            }
            Some(DirectCommand::Help) => {
                self.reply(message, HELP_TEXT).await?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn handle_group(&self, message: &Message) -> Result<usize, BotError> {
        let mut actions = 0;

        if let Some(marker) = classify_hashtags(&message.hashtags) {
            self.react(&message.id, marker.emoji()).await?;
            actions += 1;
        }

        match parse_group_command(&message.body, &self.bot.username) {
            Some(GroupCommand::ListTopics) => {
                let topics = self.open_topics(&message.channel_id).await?;
                let listing = topics
                    .iter()
                    .map(|topic| format!("* {}", strip_hashtags(&topic.body)))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.reply(message, &listing).await?;
                actions += 1;
            }
            Some(GroupCommand::CompleteAll) => {
                let topics = self.open_topics(&message.channel_id).await?;
                for topic in &topics {
                    self.react(&topic.id, emoji::COMPLETED).await?;
                    actions += 1;
                }
                self.react(&message.id, emoji::COMPLETED).await?;
                actions += 1;
                info!(
                    event_name = "bot.topics.completed",
                    channel_id = %message.channel_id,
                    completed = topics.len(),
                    "marked open topics complete"
                );
            }
            None => {}
        }

        Ok(actions)
    }

    async fn open_topics(&self, channel_id: &str) -> Result<Vec<Message>, BotError> {
        self.topics.list_open_topics(self.api.as_ref(), channel_id, &self.bot.id).await
    }

    async fn react(&self, post_id: &str, emoji_name: &str) -> Result<(), BotError> {
        let reaction = NewReaction {
            user_id: self.bot.id.clone(),
            post_id: post_id.to_owned(),
            emoji_name: emoji_name.to_owned(),
        };
        self.api.save_reaction(&reaction).await.map_err(|error| {
            BotError::reply(format!("save reaction `{emoji_name}` on {post_id}"), error)
        })
    }

    async fn reply(&self, parent: &Message, body: &str) -> Result<(), BotError> {
        self.api
            .create_post(&NewPost::reply_to(parent, body))
            .await
            .map(|_| ())
            .map_err(|error| BotError::reply(format!("reply to {}", parent.id), error))
    }
}

#[async_trait]
impl EventHandler for CommandDispatcher {
    fn event_type(&self) -> ServerEventType {
        ServerEventType::Posted
    }

    async fn handle(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ServerEvent::Posted(posted) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(self.handle_message(&posted.message, ctx).await?)
    }

    async fn session_started(&self) {
        self.cache.clear().await;
    }
}
