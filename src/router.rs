//! Channel event router.
//!
//! Receives channel messages for the live binding, drops anything that is
//! not a notification or that arrives for a stale binding, merges the rest
//! into the store and offers them to the display queue.

use std::sync::{Arc, Mutex, PoisonError};

use crate::connection::{BindingTicket, LivenessGuard};
use crate::constants::NOTIFICATION_EVENT;
use crate::display::DisplayQueue;
use crate::notification::Notification;
use crate::store::{MergeOutcome, NotificationStore};

/// What happened to one routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not the notification event.
    IgnoredEvent,
    /// The binding the event was delivered for is gone.
    Stale,
    /// Payload did not parse as a notification.
    Malformed,
    /// Merged into the store.
    Merged {
        /// Whether it was new or an update.
        outcome: MergeOutcome,
        /// Whether it was enqueued for display.
        displayed: bool,
    },
}

/// Routes channel messages into the store and display queue.
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    store: Arc<Mutex<NotificationStore>>,
    display: Arc<DisplayQueue>,
    guard: LivenessGuard,
}

impl ChannelRouter {
    /// Create a router over the shared store and queue.
    pub fn new(
        store: Arc<Mutex<NotificationStore>>,
        display: Arc<DisplayQueue>,
        guard: LivenessGuard,
    ) -> Self {
        Self {
            store,
            display,
            guard,
        }
    }

    /// Handle one channel message delivered for `ticket`.
    pub fn route(&self, ticket: &BindingTicket, event: &str, data: serde_json::Value) -> RouteOutcome {
        if event != NOTIFICATION_EVENT {
            log::trace!("[Router] Ignoring event {}", event);
            return RouteOutcome::IgnoredEvent;
        }

        let notification: Notification = match serde_json::from_value(data) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("[Router] Malformed notification payload: {}", e);
                return RouteOutcome::Malformed;
            }
        };

        // Teardown advances the guard under the store lock, so holding it
        // through `offer` keeps a departed binding from toasting.
        let (outcome, displayed) = {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.guard.is_current(ticket) {
                log::debug!(
                    "[Router] Dropping {} for stale binding {}",
                    notification.id,
                    ticket.binding()
                );
                return RouteOutcome::Stale;
            }
            let outcome = store.merge(notification.clone());
            (outcome, self.display.offer(&notification))
        };

        log::debug!(
            "[Router] {:?} notification {} ({}), displayed={}",
            outcome,
            notification.id,
            notification.event_type,
            displayed
        );
        RouteOutcome::Merged { outcome, displayed }
    }
}
