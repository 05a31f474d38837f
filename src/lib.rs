//! Pushline - real-time notification delivery client.
//!
//! Binds a signed-in identity to a single live push-channel subscription,
//! keeps a local notification list reconciled with the server, and paces
//! user-facing toasts.
//!
//! # Architecture
//!
//! - **Identity** - turns sign-in/sign-out/verification-failure into bind/unbind
//! - **Connection** - owns the one live push connection and its lifecycle
//! - **Router** - routes channel events into the store and display queue
//! - **Store** - capped, most-recent-first list plus unread counter
//! - **Display** - rate-limited toast queue backed by a persisted dedup set
//!
//! # Modules
//!
//! - [`center`] - Facade wiring everything together
//! - [`api`] - HTTP client for the notification server
//! - [`transport`] - Push transport trait and Pusher implementation
//! - [`config`] - Configuration loading/saving

pub mod api;
pub mod center;
pub mod config;
pub mod connection;
pub mod constants;
pub mod dedup;
pub mod display;
pub mod error;
pub mod identity;
pub mod notification;
pub mod router;
pub mod storage;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use center::{NotificationCenter, NotificationCenterBuilder};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionPhase, ExclusiveSlot};
pub use display::{LogSink, ToastSink};
pub use error::Error;
pub use identity::{IdentityCoordinator, IdentityEvent};
pub use notification::{ConnectionBinding, Notification, NotificationId};
