//! Pusher-protocol push transport.
//!
//! Each [`PushTransport::open`] call spawns one background task that owns a
//! WebSocket for a single private channel:
//!
//! ```text
//!   open(channel)                 background task
//!        │                              │
//!        │  spawn ───────────────────►  connect ws
//!        │                              wait pusher:connection_established → socket_id
//!        │                              POST /broadcasting/auth → signature
//!        │                              send pusher:subscribe
//!        │  ◄── TransportEvent ──────   route frames until cancel / close
//!        ▼
//!   PushConnection { events, cancel }
//! ```
//!
//! # Protocol
//!
//! - `pusher:connection_established` carries `socket_id` inside a JSON string
//! - `pusher_internal:subscription_succeeded` confirms the subscription
//! - `pusher:subscription_error` rejects it
//! - `pusher:ping` is answered with `pusher:pong`
//! - any other event on our channel is a payload; `data` is usually a JSON
//!   string and is decoded before delivery
//!
//! The task never reconnects. A dropped socket is reported and the event
//! stream ends; rebinding is the caller's decision.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ws::{self, WsFrame, WsReader, WsWriter};
use super::{PushConnection, PushTransport, TransportEvent, TransportState};
use crate::api::ChannelAuthorizer;
use crate::constants::{HANDSHAKE_TIMEOUT, PUSHER_PROTOCOL_VERSION, TRANSPORT_EVENT_BUFFER};

/// Where and how to reach the push service.
#[derive(Debug, Clone)]
pub struct PusherConfig {
    /// Push host, e.g. `https://ws.example.com` (scheme converted to ws/wss).
    pub host: String,
    /// Application key issued by the push service.
    pub app_key: String,
}

impl PusherConfig {
    /// Build the socket URL for this app.
    #[must_use]
    pub fn socket_url(&self) -> String {
        format!(
            "{}/app/{}?protocol={}&client=pushline&version={}",
            ws::http_to_ws_scheme(self.host.trim_end_matches('/')),
            self.app_key,
            PUSHER_PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION")
        )
    }
}

/// WebSocket transport speaking the Pusher channels protocol.
#[derive(Debug, Clone)]
pub struct PusherTransport {
    config: PusherConfig,
    authorizer: Arc<dyn ChannelAuthorizer>,
}

impl PusherTransport {
    /// Create a transport that signs subscriptions with `authorizer`.
    pub fn new(config: PusherConfig, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self { config, authorizer }
    }
}

impl PushTransport for PusherTransport {
    fn open(&self, channel_name: &str) -> anyhow::Result<PushConnection> {
        let (tx, rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let session = Session {
            url: self.config.socket_url(),
            channel: channel_name.to_string(),
            authorizer: Arc::clone(&self.authorizer),
            events: tx,
            cancel: cancel.clone(),
            state: TransportState::Initialized,
        };
        tokio::spawn(session.run());

        Ok(PushConnection::new(rx, cancel))
    }
}

/// Raw Pusher frame. `data` is a string or an object depending on sender.
#[derive(Debug, Deserialize)]
struct PusherFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Established {
    socket_id: String,
}

/// What the message loop should do with one text frame.
#[derive(Debug, PartialEq)]
enum FrameAction {
    Pong,
    Succeeded,
    Failed(String),
    Deliver { event: String, data: serde_json::Value },
    Ignore,
}

/// Decode a `data` field that may be a JSON-encoded string.
fn decode_data(data: Option<serde_json::Value>) -> serde_json::Value {
    match data {
        Some(serde_json::Value::String(raw)) => {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        }
        Some(value) => value,
        None => serde_json::Value::Null,
    }
}

/// Classify a text frame received after subscribing to `channel`.
fn classify_frame(text: &str, channel: &str) -> FrameAction {
    let Ok(frame) = serde_json::from_str::<PusherFrame>(text) else {
        log::warn!(
            "[Pusher] Unparseable frame: {}",
            text.chars().take(100).collect::<String>()
        );
        return FrameAction::Ignore;
    };
    let on_our_channel = frame.channel.as_deref() == Some(channel);

    match frame.event.as_str() {
        "pusher:ping" => FrameAction::Pong,
        "pusher_internal:subscription_succeeded" if on_our_channel => FrameAction::Succeeded,
        "pusher:subscription_error" => {
            let data = decode_data(frame.data);
            let reason = data
                .get("error")
                .and_then(|e| e.as_str())
                .map_or_else(|| data.to_string(), str::to_string);
            FrameAction::Failed(reason)
        }
        "pusher:error" => {
            log::warn!("[Pusher] Server error: {}", decode_data(frame.data));
            FrameAction::Ignore
        }
        event if event.starts_with("pusher:") || event.starts_with("pusher_internal:") => {
            log::trace!("[Pusher] Unhandled protocol event {}", event);
            FrameAction::Ignore
        }
        _ if on_our_channel => FrameAction::Deliver {
            event: frame.event,
            data: decode_data(frame.data),
        },
        _ => {
            log::trace!("[Pusher] Event for foreign channel: {:?}", frame.channel);
            FrameAction::Ignore
        }
    }
}

/// One socket, one channel.
struct Session {
    url: String,
    channel: String,
    authorizer: Arc<dyn ChannelAuthorizer>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    state: TransportState,
}

/// Why the message loop stopped.
enum LoopExit {
    Cancelled,
    Dropped,
    ReceiverGone,
}

impl Session {
    async fn run(mut self) {
        self.transition(TransportState::Connecting).await;

        let cancel = self.cancel.clone();
        let connected = tokio::select! {
            () = cancel.cancelled() => None,
            result = self.connect() => Some(result),
        };

        let (mut writer, mut reader) = match connected {
            None => {
                self.transition(TransportState::Disconnected).await;
                return;
            }
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                log::warn!("[Pusher] Connection failed: {:#}", e);
                self.transition(TransportState::Failed).await;
                self.emit(TransportEvent::SubscriptionFailed(format!("{e:#}"))).await;
                return;
            }
        };

        match self.run_message_loop(&mut writer, &mut reader).await {
            LoopExit::Cancelled => log::info!("[Pusher] Closing connection for {}", self.channel),
            LoopExit::Dropped => log::info!("[Pusher] Connection for {} dropped", self.channel),
            LoopExit::ReceiverGone => log::debug!("[Pusher] Event receiver gone, closing"),
        }
        if let Err(e) = writer.close().await {
            log::debug!("[Pusher] Close failed (ignored): {:#}", e);
        }
        self.transition(TransportState::Disconnected).await;
    }

    /// Dial, wait for the greeting, authorize, and send the subscribe frame.
    async fn connect(&mut self) -> anyhow::Result<(WsWriter, WsReader)> {
        log::info!("[Pusher] Connecting for channel {}", self.channel);
        let (mut writer, mut reader) = ws::connect(&self.url).await?;

        let socket_id = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            wait_for_established(&mut writer, &mut reader),
        )
        .await
        .map_err(|_elapsed| anyhow::anyhow!("No connection_established within {:?}", HANDSHAKE_TIMEOUT))??;
        log::debug!("[Pusher] Connected with socket id {}", socket_id);
        self.transition(TransportState::Connected).await;

        let auth = self
            .authorizer
            .authorize(&socket_id, &self.channel)
            .await
            .map_err(|e| anyhow::anyhow!("Channel authorization failed: {e:#}"))?;

        let subscribe = serde_json::json!({
            "event": "pusher:subscribe",
            "data": { "channel": self.channel, "auth": auth }
        });
        writer.send_text(&subscribe.to_string()).await?;
        log::debug!("[Pusher] Sent subscribe for {}", self.channel);

        Ok((writer, reader))
    }

    async fn run_message_loop(&mut self, writer: &mut WsWriter, reader: &mut WsReader) -> LoopExit {
        let cancel = self.cancel.clone();
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return LoopExit::Cancelled,
                frame = reader.recv() => frame,
            };

            let text = match frame {
                Some(Ok(WsFrame::Text(text))) => text,
                Some(Ok(WsFrame::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        log::warn!("[Pusher] Failed to answer socket ping: {:#}", e);
                        return LoopExit::Dropped;
                    }
                    continue;
                }
                Some(Ok(WsFrame::Close { code, reason })) => {
                    log::info!("[Pusher] Server closed socket ({}: {})", code, reason);
                    return LoopExit::Dropped;
                }
                Some(Ok(WsFrame::Other)) => continue,
                Some(Err(e)) => {
                    log::warn!("[Pusher] Socket error: {:#}", e);
                    return LoopExit::Dropped;
                }
                None => return LoopExit::Dropped,
            };

            let event = match classify_frame(&text, &self.channel) {
                FrameAction::Pong => {
                    let pong = serde_json::json!({ "event": "pusher:pong", "data": {} });
                    if let Err(e) = writer.send_text(&pong.to_string()).await {
                        log::warn!("[Pusher] Failed to answer ping: {:#}", e);
                        return LoopExit::Dropped;
                    }
                    continue;
                }
                FrameAction::Succeeded => TransportEvent::SubscriptionSucceeded,
                FrameAction::Failed(reason) => TransportEvent::SubscriptionFailed(reason),
                FrameAction::Deliver { event, data } => TransportEvent::Message { event, data },
                FrameAction::Ignore => continue,
            };

            if self.events.send(event).await.is_err() {
                return LoopExit::ReceiverGone;
            }
        }
    }

    async fn transition(&mut self, next: TransportState) {
        let previous = std::mem::replace(&mut self.state, next);
        log::debug!("[Pusher] State {} -> {}", previous, next);
        self.emit(TransportEvent::StateChanged {
            previous,
            current: next,
        })
        .await;
    }

    async fn emit(&self, event: TransportEvent) {
        // The receiver is gone once the owner tore the connection down.
        let _ = self.events.send(event).await;
    }
}

/// Wait for `pusher:connection_established` and return the socket id.
async fn wait_for_established(
    writer: &mut WsWriter,
    reader: &mut WsReader,
) -> anyhow::Result<String> {
    while let Some(frame) = reader.recv().await {
        match frame? {
            WsFrame::Text(text) => {
                let Ok(frame) = serde_json::from_str::<PusherFrame>(&text) else {
                    continue;
                };
                match frame.event.as_str() {
                    "pusher:connection_established" => {
                        let established: Established =
                            serde_json::from_value(decode_data(frame.data))?;
                        return Ok(established.socket_id);
                    }
                    "pusher:error" => {
                        anyhow::bail!("Server refused connection: {}", decode_data(frame.data));
                    }
                    _ => {}
                }
            }
            WsFrame::Ping(data) => writer.send_pong(data).await?,
            WsFrame::Close { code, reason } => {
                anyhow::bail!("Socket closed before greeting ({code}: {reason})");
            }
            WsFrame::Other => {}
        }
    }

    anyhow::bail!("Socket ended before greeting")
}
