//! Push transport abstraction.
//!
//! The connection manager only needs three things from the push service:
//! open a subscription to one private channel, learn whether it succeeded,
//! and receive the events published on it. [`PushTransport`] captures that
//! seam so tests can drive the lifecycle without a socket.
//!
//! # Architecture
//!
//! ```text
//! PushTransport (trait)
//!     │
//!     ├── PusherTransport      WebSocket + Pusher protocol + HTTP channel auth
//!     │
//!     └── (tests)              in-memory senders
//!
//! open(channel) ──► PushConnection { events: Receiver<TransportEvent>, cancel }
//! ```
//!
//! A connection lives until [`PushConnection::close`] is called or the
//! socket drops. There is no reconnection at this layer; a dropped socket
//! is reported as a state change and the event stream ends.

pub mod pusher;
pub mod ws;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use pusher::{PusherConfig, PusherTransport};

/// Socket state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, not yet dialing.
    Initialized,
    /// Dialing or waiting for the server greeting.
    Connecting,
    /// Greeting received.
    Connected,
    /// Socket closed (by us or the server).
    Disconnected,
    /// Could not connect.
    Failed,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Lifecycle signal or payload delivered by an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The underlying socket moved between states.
    StateChanged {
        /// State before the transition.
        previous: TransportState,
        /// State after the transition.
        current: TransportState,
    },
    /// The server accepted the channel subscription.
    SubscriptionSucceeded,
    /// The subscription was rejected, could not be authorized, or the
    /// socket never came up.
    SubscriptionFailed(String),
    /// An event published on the subscribed channel.
    Message {
        /// Event name.
        event: String,
        /// Decoded payload.
        data: serde_json::Value,
    },
}

/// An open (or opening) subscription.
#[derive(Debug)]
pub struct PushConnection {
    events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
}

impl PushConnection {
    /// Wrap an event receiver and the token that stops its producer.
    pub fn new(events: mpsc::Receiver<TransportEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Split into the event stream and a handle that closes the connection.
    pub fn into_parts(self) -> (mpsc::Receiver<TransportEvent>, ConnectionCloser) {
        (
            self.events,
            ConnectionCloser {
                cancel: self.cancel,
            },
        )
    }

    /// Ask the producer to disconnect.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Handle that disconnects a [`PushConnection`] after it has been split.
#[derive(Debug, Clone)]
pub struct ConnectionCloser {
    cancel: CancellationToken,
}

impl ConnectionCloser {
    /// Ask the producer to disconnect. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether close has been requested.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Opens push subscriptions.
pub trait PushTransport: Send + Sync + std::fmt::Debug {
    /// Start connecting and subscribing to `channel_name`.
    ///
    /// Returns immediately; progress is reported through the connection's
    /// event stream. Must be called from within a Tokio runtime.
    fn open(&self, channel_name: &str) -> anyhow::Result<PushConnection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closer_is_idempotent() {
        let (_tx, rx) = mpsc::channel(1);
        let (_events, closer) = PushConnection::new(rx, CancellationToken::new()).into_parts();

        assert!(!closer.is_closed());
        closer.close();
        closer.close();
        assert!(closer.is_closed());
    }

    #[test]
    fn test_state_display_matches_wire_names() {
        assert_eq!(TransportState::Connected.to_string(), "connected");
        assert_eq!(TransportState::Failed.to_string(), "failed");
    }
}
