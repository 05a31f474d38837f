//! Persisted record of notification ids already offered for display.
//!
//! The tracker is loaded once at startup and written back on every change.
//! It is scoped to the storage profile, not to an identity, so switching
//! users does not re-toast notifications seen before the switch.
//!
//! The persisted layout is a JSON array of ids, oldest first, under
//! [`DEDUP_STORAGE_KEY`](crate::constants::DEDUP_STORAGE_KEY).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::constants::{DEDUP_STORAGE_KEY, MAX_DEDUP_ENTRIES};
use crate::notification::NotificationId;
use crate::storage::KeyValueStore;

/// Bounded FIFO set of shown notification ids.
#[derive(Debug)]
pub struct DedupTracker {
    order: VecDeque<NotificationId>,
    members: HashSet<NotificationId>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
}

impl DedupTracker {
    /// Load the tracker from `store`, starting empty if nothing usable is
    /// persisted.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_capacity(store, MAX_DEDUP_ENTRIES)
    }

    /// Load with an explicit capacity.
    pub fn load_with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let persisted: Vec<NotificationId> = match store.get(DEDUP_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("[Dedup] Ignoring malformed persisted ids: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("[Dedup] Failed to read persisted ids: {:#}", e);
                Vec::new()
            }
        };

        let mut tracker = Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
            store,
        };
        for id in persisted {
            if tracker.members.insert(id) {
                tracker.order.push_back(id);
            }
        }
        tracker.evict_overflow();

        log::debug!("[Dedup] Loaded {} shown ids", tracker.order.len());
        tracker
    }

    /// Record `id` as shown.
    ///
    /// Returns `true` if the id was new (and should be displayed), `false`
    /// if it was already tracked.
    pub fn insert(&mut self, id: NotificationId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        self.evict_overflow();
        self.persist();
        true
    }

    /// Whether `id` has already been offered for display.
    pub fn contains(&self, id: NotificationId) -> bool {
        self.members.contains(&id)
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no ids are tracked.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tracked ids, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = NotificationId> + '_ {
        self.order.iter().copied()
    }

    fn evict_overflow(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn persist(&self) {
        let ids: Vec<NotificationId> = self.order.iter().copied().collect();
        let result = serde_json::to_string(&ids)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.set(DEDUP_STORAGE_KEY, &raw));
        if let Err(e) = result {
            log::warn!("[Dedup] Failed to persist shown ids: {:#}", e);
        }
    }
}
