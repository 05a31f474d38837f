//! Crate-wide constants for pushline.
//!
//! Magic numbers and wire names live here so the modules that use them
//! stay readable and tests can refer to the same values.
//!
//! # Categories
//!
//! - **Timeouts**: Network operation limits
//! - **Caps**: Size bounds for the store and dedup tracker
//! - **Display**: Toast pacing
//! - **Wire**: Channel/event names and storage keys

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to the notification list fetch, mark-as-read acknowledgements,
/// and channel authorization.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the push server's greeting after the socket opens.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Caps
// ============================================================================

/// Maximum number of notifications held by the store.
///
/// Merges beyond this drop entries from the tail (oldest first).
pub const MAX_NOTIFICATIONS: usize = 100;

/// Maximum number of ids remembered by the dedup tracker.
pub const MAX_DEDUP_ENTRIES: usize = 100;

// ============================================================================
// Display
// ============================================================================

/// Delay between consecutive toasts.
///
/// At most one toast is shown per window, no matter how many arrive.
pub const DEFAULT_TOAST_INTERVAL: Duration = Duration::from_secs(1);

/// Event type that never raises a toast or bumps the unread counter.
///
/// Direct messages have their own unread surface elsewhere in the UI.
pub const EXCLUDED_EVENT_TYPE: &str = "message";

// ============================================================================
// Wire
// ============================================================================

/// Name of the push event carrying a notification payload.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Prefix of the per-identity private channel.
pub const CHANNEL_PREFIX: &str = "private-notifications";

/// Storage key under which the dedup tracker persists its id list.
pub const DEDUP_STORAGE_KEY: &str = "pushline.shown_notification_ids";

/// Pusher protocol revision spoken by the transport.
pub const PUSHER_PROTOCOL_VERSION: u8 = 7;

/// Buffer of transport events per connection before backpressure.
pub const TRANSPORT_EVENT_BUFFER: usize = 256;
