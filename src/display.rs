//! Rate-limited toast delivery.
//!
//! [`DisplayQueue`] accepts notifications from the router and hands them to
//! a [`ToastSink`] one at a time from a single worker task. After each toast
//! the worker sleeps for the configured interval, so a burst of pushes
//! shows at most one toast per interval.
//!
//! # Architecture
//!
//! ```text
//!   ChannelRouter ──offer()──► DedupTracker ──new id──► mpsc ──► worker
//!                                                                  │
//!                                                    show(), sleep(interval)
//!                                                                  ▼
//!                                                              ToastSink
//! ```
//!
//! Queued toasts are not cancelled on unbind; the dedup cap is the only
//! bound on what may still be waiting.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dedup::DedupTracker;
use crate::notification::Notification;

/// Surface that renders toasts (terminal, desktop notifier, UI bridge).
///
/// Clicking a toast is expected to call
/// [`NotificationCenter::mark_as_read`](crate::NotificationCenter::mark_as_read)
/// with the toast's id.
pub trait ToastSink: Send + Sync + std::fmt::Debug {
    /// Render one toast.
    fn show(&self, toast: &Notification);
}

/// Sink that writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ToastSink for LogSink {
    fn show(&self, toast: &Notification) {
        log::info!(
            "[Display] {} ({}): {}",
            toast.event_type,
            toast.id,
            toast.message
        );
    }
}

/// Single-worker, fixed-interval toast queue.
#[derive(Debug)]
pub struct DisplayQueue {
    tx: mpsc::UnboundedSender<Notification>,
    dedup: Arc<Mutex<DedupTracker>>,
    worker: JoinHandle<()>,
}

impl DisplayQueue {
    /// Spawn the display worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        sink: Arc<dyn ToastSink>,
        dedup: Arc<Mutex<DedupTracker>>,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_display_worker(rx, sink, interval));

        Self { tx, dedup, worker }
    }

    /// Offer a notification for display.
    ///
    /// Enqueues only unread, non-excluded notifications whose id has not
    /// been offered before. Returns `true` if it was enqueued.
    pub fn offer(&self, notification: &Notification) -> bool {
        if !notification.is_alertable() {
            return false;
        }

        let is_new = self
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(notification.id);
        if !is_new {
            log::trace!("[Display] Already shown {}, skipping", notification.id);
            return false;
        }

        if self.tx.send(notification.clone()).is_err() {
            log::warn!("[Display] Worker stopped, dropping toast {}", notification.id);
            return false;
        }
        true
    }

    /// Shared dedup tracker.
    pub fn dedup(&self) -> &Arc<Mutex<DedupTracker>> {
        &self.dedup
    }
}

impl Drop for DisplayQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Show one toast, then wait out the interval before taking the next.
async fn run_display_worker(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    sink: Arc<dyn ToastSink>,
    interval: Duration,
) {
    while let Some(toast) = rx.recv().await {
        log::debug!("[Display] Showing toast {}", toast.id);
        sink.show(&toast);
        tokio::time::sleep(interval).await;
    }
    log::debug!("[Display] Queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationId;
    use crate::storage::MemoryStore;
    use tokio::time::Instant;

    #[derive(Debug, Default)]
    struct RecordingSink {
        shown: Mutex<Vec<(NotificationId, Instant)>>,
    }

    impl RecordingSink {
        fn ids(&self) -> Vec<u64> {
            self.shown.lock().unwrap().iter().map(|(id, _)| id.0).collect()
        }
    }

    impl ToastSink for RecordingSink {
        fn show(&self, toast: &Notification) {
            self.shown.lock().unwrap().push((toast.id, Instant::now()));
        }
    }

    fn note(id: u64, event_type: &str, is_read: bool) -> Notification {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "event_type": event_type,
            "is_read": is_read,
        }))
        .unwrap()
    }

    fn queue(sink: &Arc<RecordingSink>) -> DisplayQueue {
        let dedup = DedupTracker::load(Arc::new(MemoryStore::new()));
        DisplayQueue::spawn(
            Arc::clone(sink) as Arc<dyn ToastSink>,
            Arc::new(Mutex::new(dedup)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_paced_one_per_interval() {
        let sink = Arc::new(RecordingSink::default());
        let queue = queue(&sink);

        for id in 1..=3 {
            assert!(queue.offer(&note(id, "NEW_BOOKING", false)));
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.ids(), vec![1]);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.ids(), vec![1, 2]);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.ids(), vec![1, 2, 3]);

        let shown = sink.shown.lock().unwrap();
        for pair in shown.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_read_excluded_and_seen() {
        let sink = Arc::new(RecordingSink::default());
        let queue = queue(&sink);

        assert!(!queue.offer(&note(1, "NEW_BOOKING", true)));
        assert!(!queue.offer(&note(2, "message", false)));
        assert!(queue.offer(&note(3, "NEW_BOOKING", false)));
        assert!(!queue.offer(&note(3, "NEW_BOOKING", false)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.ids(), vec![3]);
        assert_eq!(queue.dedup().lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previously_persisted_ids_are_not_shown() {
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(MemoryStore::new());
        let mut seeded = DedupTracker::load(Arc::clone(&store) as Arc<dyn crate::storage::KeyValueStore>);
        seeded.insert(NotificationId(8));

        let reloaded = DedupTracker::load(store);
        let queue = DisplayQueue::spawn(
            Arc::clone(&sink) as Arc<dyn ToastSink>,
            Arc::new(Mutex::new(reloaded)),
            Duration::from_secs(1),
        );

        assert!(!queue.offer(&note(8, "NEW_BOOKING", false)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.ids().is_empty());
    }
}
