//! Notification data model.
//!
//! A [`Notification`] is what the server hands back from the list endpoint
//! and what the push channel delivers one at a time. Identity is the
//! [`NotificationId`]; the store, not the transport, keeps ids unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CHANNEL_PREFIX, EXCLUDED_EVENT_TYPE};

/// Server-assigned notification identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NotificationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A single user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: NotificationId,
    /// Event type (e.g., "NEW_BOOKING", "message").
    pub event_type: String,
    /// Human-readable text.
    #[serde(default)]
    pub message: String,
    /// Arbitrary payload used by the UI for routing on click.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Whether the user has read it.
    #[serde(default)]
    pub is_read: bool,
    /// When the server created it.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Returns `true` for the event type that never toasts or counts.
    pub fn is_excluded_type(&self) -> bool {
        self.event_type.eq_ignore_ascii_case(EXCLUDED_EVENT_TYPE)
    }

    /// Returns `true` if this notification should bump the unread counter
    /// and be offered for display.
    pub fn is_alertable(&self) -> bool {
        !self.is_read && !self.is_excluded_type()
    }
}

/// The identity key of the single live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionBinding {
    /// Signed-in user id.
    pub user_id: u64,
    /// Role the user signed in as (e.g., "creator", "brand").
    pub user_role: String,
}

impl ConnectionBinding {
    /// Create a binding key.
    pub fn new(user_id: u64, user_role: impl Into<String>) -> Self {
        Self {
            user_id,
            user_role: user_role.into(),
        }
    }

    /// Private channel this binding subscribes to.
    ///
    /// Deterministic in `(user_role, user_id)` so the server can authorize
    /// it against the session.
    #[must_use]
    pub fn channel_name(&self) -> String {
        format!("{}.{}.{}", CHANNEL_PREFIX, self.user_role, self.user_id)
    }
}

impl std::fmt::Display for ConnectionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.user_role, self.user_id)
    }
}
