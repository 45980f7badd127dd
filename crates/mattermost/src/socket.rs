use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::events::{
    decode_frame, EventContext, EventDispatcher, EventEnvelope, ServerEvent,
};

const AUTH_CHALLENGE_SEQ: i64 = 1;
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport authentication failed: {0}")]
    Authenticate(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("websocket reconnect gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed reconnects tolerated; `None` retries forever.
    pub max_retries: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: None, base_delay_ms: 5_000, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// Opens the connection and completes authentication.
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next text frame, or `None` once the server closed the stream.
    async fn next_frame(&self) -> Result<Option<String>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: String,
    token: SecretString,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, token: SecretString) -> Self {
        Self { url: url.into(), token, stream: Mutex::new(None) }
    }

    async fn await_authentication(stream: &mut WsStream) -> Result<(), TransportError> {
        loop {
            let Some(message) = stream.next().await else {
                return Err(TransportError::Authenticate(
                    "server closed the connection during authentication".to_owned(),
                ));
            };
            let message = message.map_err(|error| TransportError::Authenticate(error.to_string()))?;
            let Some(text) = frame_text(message)? else {
                continue;
            };

            match decode_frame(&text).map(|envelope| envelope.event) {
                Ok(ServerEvent::Reply { seq_reply, ok: true, .. })
                    if seq_reply == AUTH_CHALLENGE_SEQ =>
                {
                    return Ok(())
                }
                Ok(ServerEvent::Hello { .. }) => return Ok(()),
                Ok(ServerEvent::Reply { ok: false, error, .. }) => {
                    return Err(TransportError::Authenticate(
                        error.unwrap_or_else(|| "authentication challenge rejected".to_owned()),
                    ))
                }
                Ok(_) | Err(_) => continue,
            }
        }
    }
}

fn frame_text(message: WsMessage) -> Result<Option<String>, TransportError> {
    match message {
        WsMessage::Text(text) => Ok(Some(text.as_str().to_owned())),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|error| TransportError::Receive(format!("invalid utf-8 frame: {error}"))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let (mut stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let challenge = json!({
            "seq": AUTH_CHALLENGE_SEQ,
            "action": "authentication_challenge",
            "data": { "token": self.token.expose_secret() }
        })
        .to_string();
        stream
            .send(WsMessage::Text(challenge.into()))
            .await
            .map_err(|error| TransportError::Authenticate(error.to_string()))?;

        tokio::time::timeout(AUTH_TIMEOUT, Self::await_authentication(&mut stream))
            .await
            .map_err(|_| {
                TransportError::Authenticate("timed out waiting for authentication".to_owned())
            })??;

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("transport is not connected".to_owned()));
        };

        loop {
            let Some(message) = stream.next().await else {
                break;
            };
            let message = message.map_err(|error| TransportError::Receive(error.to_string()))?;
            if matches!(message, WsMessage::Close(_)) {
                break;
            }
            if let Some(text) = frame_text(message)? {
                return Ok(Some(text));
            }
        }

        // Closed by the server; nothing left to close on our side.
        *guard = None;
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

pub struct ListenRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl ListenRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs until the first connection fails or reconnects are exhausted.
    pub async fn start(&self) -> Result<(), SocketError> {
        let mut established = false;
        let mut failures: u32 = 0;

        loop {
            info!(attempt = failures, "opening mattermost websocket connection");
            match self.transport.connect().await {
                Ok(()) => {
                    established = true;
                    failures = 0;
                    info!(
                        event_name = "ingress.mattermost.session_started",
                        "mattermost websocket connected"
                    );
                    self.dispatcher.session_started().await;

                    match self.pump().await {
                        Ok(()) => info!("mattermost websocket stream closed by server"),
                        Err(transport_error) => {
                            warn!(
                                error = %transport_error,
                                "mattermost websocket transport failed"
                            );
                            if let Err(error) = self.transport.disconnect().await {
                                debug!(error = %error, "disconnect after transport failure failed");
                            }
                        }
                    }
                }
                Err(transport_error) if !established => {
                    error!(
                        error = %transport_error,
                        "initial mattermost websocket connection failed"
                    );
                    return Err(SocketError::Transport(transport_error));
                }
                Err(transport_error) => {
                    warn!(
                        attempt = failures,
                        max_retries = ?self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "mattermost websocket reconnect failed"
                    );
                }
            }

            if let Some(max_retries) = self.reconnect_policy.max_retries {
                if failures >= max_retries {
                    warn!(max_retries, "mattermost websocket retries exhausted");
                    return Err(SocketError::RetriesExhausted { attempts: failures });
                }
            }

            let delay = self.reconnect_policy.backoff(failures);
            failures += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn pump(&self) -> Result<(), TransportError> {
        loop {
            let Some(frame) = self.transport.next_frame().await? else {
                if let Err(error) = self.transport.disconnect().await {
                    debug!(error = %error, "disconnect after server close failed");
                }
                return Ok(());
            };

            let envelope = match decode_frame(&frame) {
                Ok(envelope) => envelope,
                Err(decode_error) => {
                    warn!(
                        event_name = "ingress.mattermost.decode_failed",
                        error = %decode_error,
                        "dropping undecodable websocket frame"
                    );
                    continue;
                }
            };

            let correlation_id = format!("ws-{}", envelope.seq);
            let (channel_id, post_id) = correlation_fields(&envelope);
            debug!(
                event_name = "ingress.mattermost.event_received",
                correlation_id = %correlation_id,
                event_type = ?envelope.event.event_type(),
                channel_id = channel_id.unwrap_or("unknown"),
                post_id = post_id.unwrap_or("unknown"),
                "received mattermost event"
            );

            if let ServerEvent::Reply { ok: false, error, seq_reply } = &envelope.event {
                warn!(
                    seq_reply,
                    error = error.as_deref().unwrap_or("unknown"),
                    "server rejected action"
                );
            }

            let context = EventContext { correlation_id: correlation_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    correlation_id = %correlation_id,
                    channel_id = channel_id.unwrap_or("unknown"),
                    post_id = post_id.unwrap_or("unknown"),
                    error = %error,
                    "event dispatch failed; continuing listen loop"
                );
            }
        }
    }
}

fn correlation_fields(envelope: &EventEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        ServerEvent::Posted(posted) => {
            (Some(posted.message.channel_id.as_str()), Some(posted.message.id.as_str()))
        }
        _ => (None, None),
    }
}
