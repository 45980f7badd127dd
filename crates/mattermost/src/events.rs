use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use meetmatter_core::{BotError, ChannelKind, Message};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEnvelope {
    pub seq: i64,
    pub event: ServerEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    Hello { server_version: Option<String> },
    Posted(PostedEvent),
    /// Answer to an action this client sent, e.g. the authentication challenge.
    Reply { seq_reply: i64, ok: bool, error: Option<String> },
    Unsupported { event_type: String },
}

impl ServerEvent {
    pub fn event_type(&self) -> ServerEventType {
        match self {
            Self::Hello { .. } => ServerEventType::Hello,
            Self::Posted(_) => ServerEventType::Posted,
            Self::Reply { .. } => ServerEventType::Reply,
            Self::Unsupported { .. } => ServerEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServerEventType {
    Hello,
    Posted,
    Reply,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedEvent {
    /// Channel kind as broadcast with the event; informational only, the
    /// dispatcher resolves the channel itself.
    pub channel_kind: Option<ChannelKind>,
    pub sender_name: Option<String>,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    seq: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    seq_reply: Option<i64>,
    #[serde(default)]
    error: Option<Value>,
}

/// Decodes one WebSocket text frame into a typed event.
pub fn decode_frame(text: &str) -> Result<EventEnvelope, BotError> {
    let frame: RawFrame = serde_json::from_str(text)?;

    if let Some(status) = frame.status {
        let seq_reply = frame.seq_reply.unwrap_or_default();
        let error = frame.error.map(|error| match &error {
            Value::Object(fields) => fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string()),
            other => other.to_string(),
        });
        return Ok(EventEnvelope {
            seq: seq_reply,
            event: ServerEvent::Reply { seq_reply, ok: status == "OK", error },
        });
    }

    let seq = frame.seq.unwrap_or_default();
    let data = frame.data.unwrap_or_default();
    let event = match frame.event.as_deref() {
        Some("posted") => ServerEvent::Posted(decode_posted(&data)?),
        Some("hello") => ServerEvent::Hello {
            server_version: data.get("server_version").and_then(Value::as_str).map(str::to_owned),
        },
        Some(other) => ServerEvent::Unsupported { event_type: other.to_owned() },
        None => return Err(BotError::Decode("frame has neither `event` nor `status`".to_owned())),
    };

    Ok(EventEnvelope { seq, event })
}

fn decode_posted(data: &Map<String, Value>) -> Result<PostedEvent, BotError> {
    let raw_post = data
        .get("post")
        .and_then(Value::as_str)
        .ok_or_else(|| BotError::Decode("posted event is missing `data.post`".to_owned()))?;
    let message: Message = serde_json::from_str(raw_post)?;

    Ok(PostedEvent {
        channel_kind: data
            .get("channel_type")
            .and_then(Value::as_str)
            .map(ChannelKind::from_type_code),
        sender_name: data.get("sender_name").and_then(Value::as_str).map(str::to_owned),
        message,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Outbound calls that succeeded while handling the event.
    Processed { actions: usize },
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Bot(#[from] BotError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ServerEventType;

    async fn handle(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    /// Called once per established WebSocket session, before any event.
    async fn session_started(&self) {}
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ServerEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub fn register_shared(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.event_type(), handler);
    }

    pub async fn dispatch(
        &self,
        envelope: &EventEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub async fn session_started(&self) {
        for handler in self.handlers.values() {
            handler.session_started().await;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use meetmatter_core::{BotError, ChannelKind};
    use serde_json::json;

    use super::{
        decode_frame, EventContext, EventDispatcher, EventEnvelope, EventHandler,
        EventHandlerError, HandlerResult, ServerEvent, ServerEventType,
    };

    fn posted_frame(post: serde_json::Value) -> String {
        json!({
            "event": "posted",
            "data": {
                "channel_type": "G",
                "sender_name": "@alice",
                "post": post.to_string()
            },
            "broadcast": {"channel_id": "c1"},
            "seq": 7
        })
        .to_string()
    }

    #[test]
    fn decodes_posted_event_with_embedded_post_json() {
        let frame = posted_frame(json!({
            "id": "p1",
            "channel_id": "c1",
            "user_id": "u1",
            "message": "#topic Plan release",
            "hashtags": "#topic"
        }));

        let envelope = decode_frame(&frame).expect("decode");

        assert_eq!(envelope.seq, 7);
        let ServerEvent::Posted(posted) = envelope.event else {
            panic!("expected posted event");
        };
        assert_eq!(posted.channel_kind, Some(ChannelKind::Group));
        assert_eq!(posted.sender_name.as_deref(), Some("@alice"));
        assert_eq!(posted.message.id, "p1");
        assert_eq!(posted.message.hashtags, "#topic");
    }

    #[test]
    fn malformed_post_payload_is_a_decode_error() {
        let frame = json!({"event": "posted", "data": {"post": "{not json"}, "seq": 3}).to_string();
        assert!(matches!(decode_frame(&frame), Err(BotError::Decode(_))));

        let missing = json!({"event": "posted", "data": {}, "seq": 4}).to_string();
        assert!(matches!(decode_frame(&missing), Err(BotError::Decode(_))));

        assert!(matches!(decode_frame("not even json"), Err(BotError::Decode(_))));
    }

    #[test]
    fn decodes_replies_and_unknown_events_without_error() {
        let ok = decode_frame(r#"{"status":"OK","seq_reply":1}"#).expect("reply");
        assert_eq!(ok.event, ServerEvent::Reply { seq_reply: 1, ok: true, error: None });

        let failed = decode_frame(
            r#"{"status":"FAIL","seq_reply":1,"error":{"id":"api.web_socket_router.not_authenticated.app_error","message":"not authenticated"}}"#,
        )
        .expect("reply");
        assert_eq!(
            failed.event,
            ServerEvent::Reply {
                seq_reply: 1,
                ok: false,
                error: Some("not authenticated".to_owned())
            }
        );

        let typing = decode_frame(r#"{"event":"typing","data":{},"seq":9}"#).expect("typing");
        assert_eq!(typing.event, ServerEvent::Unsupported { event_type: "typing".to_owned() });

        let hello =
            decode_frame(r#"{"event":"hello","data":{"server_version":"9.11.0"},"seq":0}"#)
                .expect("hello");
        assert_eq!(hello.event, ServerEvent::Hello { server_version: Some("9.11.0".to_owned()) });
    }

    #[derive(Default)]
    struct CountingHandler {
        handled: AtomicUsize,
        sessions: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn event_type(&self) -> ServerEventType {
            ServerEventType::Posted
        }

        async fn handle(
            &self,
            _envelope: &EventEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResult::Processed { actions: 1 })
        }

        async fn session_started(&self) {
            self.sessions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_by_event_type() {
        let handler = Arc::new(CountingHandler::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_shared(handler.clone());

        let hello = EventEnvelope { seq: 1, event: ServerEvent::Hello { server_version: None } };
        let result =
            dispatcher.dispatch(&hello, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);

        let posted = decode_frame(&posted_frame(json!({"id": "p1", "message": "hi"})))
            .expect("decode");
        let result =
            dispatcher.dispatch(&posted, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Processed { actions: 1 });
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_start_reaches_every_handler() {
        let handler = Arc::new(CountingHandler::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_shared(handler.clone());

        dispatcher.session_started().await;
        dispatcher.session_started().await;

        assert_eq!(handler.sessions.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.handler_count(), 1);
    }
}
