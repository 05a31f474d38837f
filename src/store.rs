//! Notification store and reconciler.
//!
//! Holds the most-recent-first list (capped) and the unread counter. The
//! counter is an accumulator: pushes increment it and mark-as-read
//! decrements it, and only [`NotificationStore::reconcile`] derives it from
//! the list. Repeated pushes of the same unread id, or repeated
//! mark-as-read calls, therefore move the counter more than once. The
//! integration tests pin this behavior down as a known defect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::NotificationApi;
use crate::connection::{BindingTicket, LivenessGuard};
use crate::constants::MAX_NOTIFICATIONS;
use crate::notification::{Notification, NotificationId};

/// Result of merging a pushed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The id was new and the entry was prepended.
    Inserted,
    /// An entry with the same id was replaced in place.
    Updated,
}

/// Ordered, capped notification list plus unread counter.
#[derive(Debug)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    unread: u64,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Empty store with the default cap.
    pub fn new() -> Self {
        Self::with_capacity(MAX_NOTIFICATIONS)
    }

    /// Empty store holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            unread: 0,
            capacity,
        }
    }

    /// Replace everything with an authoritative fetch result.
    ///
    /// The counter is recomputed from the resulting list.
    pub fn reconcile(&mut self, fetched: Vec<Notification>) {
        self.items = fetched.into_iter().take(self.capacity).collect();
        self.unread = self.items.iter().filter(|n| !n.is_read).count() as u64;
        log::debug!(
            "[Store] Reconciled {} notifications ({} unread)",
            self.items.len(),
            self.unread
        );
    }

    /// Upsert a pushed notification by id.
    ///
    /// Existing entries keep their position; new ones go to the head. The
    /// counter is bumped for every unread, non-excluded push, whether or not
    /// the id was already counted.
    pub fn merge(&mut self, notification: Notification) -> MergeOutcome {
        let bumps_counter = notification.is_alertable();

        let outcome = if let Some(existing) = self.items.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
            MergeOutcome::Updated
        } else {
            self.items.push_front(notification);
            self.items.truncate(self.capacity);
            MergeOutcome::Inserted
        };

        if bumps_counter {
            self.unread += 1;
        }
        outcome
    }

    /// Optimistically mark `id` as read and decrement the counter.
    ///
    /// The decrement happens even if the entry was already read or is not
    /// in the list; the floor is zero. Returns whether an entry was found.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        let found = match self.items.iter_mut().find(|n| n.id == id) {
            Some(entry) => {
                entry.is_read = true;
                true
            }
            None => false,
        };
        self.unread = self.unread.saturating_sub(1);
        found
    }

    /// Drop all entries and reset the counter.
    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    /// Current unread counter.
    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    /// Entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    /// Owned copy of the entries, most recent first.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    /// Look up an entry by id.
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Fetch the authoritative list for `ticket` and replace the store with it.
///
/// The result is discarded if the binding changed while the fetch was in
/// flight. Failures are logged and leave the store as it was. Returns
/// whether the store was replaced.
pub async fn reconcile(
    api: Arc<dyn NotificationApi>,
    store: Arc<Mutex<NotificationStore>>,
    guard: LivenessGuard,
    ticket: BindingTicket,
) -> bool {
    let fetched = match api.list_notifications(ticket.binding()).await {
        Ok(list) => list,
        Err(e) => {
            log::error!(
                "[Store] Reconciliation fetch failed for {}: {:#}",
                ticket.binding(),
                e
            );
            return false;
        }
    };

    let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
    if !guard.is_current(&ticket) {
        log::debug!(
            "[Store] Discarding reconciliation for stale binding {}",
            ticket.binding()
        );
        return false;
    }
    store.reconcile(fetched);
    true
}
