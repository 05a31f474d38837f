//! Notification center: the facade the host application talks to.
//!
//! Wires the subsystem together and exposes two surfaces:
//!
//! - **Identity side**: [`bind`](NotificationCenter::bind),
//!   [`unbind`](NotificationCenter::unbind),
//!   [`handle_identity_event`](NotificationCenter::handle_identity_event)
//! - **UI side**: [`notifications`](NotificationCenter::notifications),
//!   [`unread_count`](NotificationCenter::unread_count),
//!   [`mark_as_read`](NotificationCenter::mark_as_read)
//!
//! # Architecture
//!
//! ```text
//!   IdentityCoordinator ──► ConnectionManager ──► drive_events ──► ChannelRouter
//!                                  │                                 │      │
//!                                  └──(subscribed)──► reconcile ──► Store   DisplayQueue ──► ToastSink
//! ```
//!
//! The dedup tracker and display queue are created once per center and
//! outlive every binding; the store is cleared whenever the binding changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use crate::api::{ApiClient, NotificationApi};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionPhase, ExclusiveSlot};
use crate::constants::DEFAULT_TOAST_INTERVAL;
use crate::dedup::DedupTracker;
use crate::display::{DisplayQueue, LogSink, ToastSink};
use crate::error::{Error, Result};
use crate::identity::{IdentityCoordinator, IdentityEvent};
use crate::notification::{ConnectionBinding, Notification, NotificationId};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::store::NotificationStore;
use crate::transport::{PushTransport, PusherConfig, PusherTransport};

/// Builder for [`NotificationCenter`].
#[derive(Debug)]
pub struct NotificationCenterBuilder {
    transport: Arc<dyn PushTransport>,
    api: Arc<dyn NotificationApi>,
    storage: Option<Arc<dyn KeyValueStore>>,
    sink: Option<Arc<dyn ToastSink>>,
    toast_interval: Duration,
    slot: Option<Arc<ExclusiveSlot>>,
}

impl NotificationCenterBuilder {
    /// Persistence for the dedup tracker. Defaults to in-memory.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Where toasts are rendered. Defaults to [`LogSink`].
    pub fn toast_sink(mut self, sink: Arc<dyn ToastSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Delay between toasts.
    pub fn toast_interval(mut self, interval: Duration) -> Self {
        self.toast_interval = interval;
        self
    }

    /// Exclusivity slot. Defaults to the process-wide slot.
    pub fn slot(mut self, slot: Arc<ExclusiveSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Load persisted state and start the display worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> NotificationCenter {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        let slot = self.slot.unwrap_or_else(ExclusiveSlot::process);

        let dedup = Arc::new(Mutex::new(DedupTracker::load(storage)));
        let display = Arc::new(DisplayQueue::spawn(sink, dedup, self.toast_interval));
        let store = Arc::new(Mutex::new(NotificationStore::new()));

        let connections = Arc::new(ConnectionManager::new(
            self.transport,
            Arc::clone(&self.api),
            Arc::clone(&store),
            Arc::clone(&display),
            slot,
        ));

        NotificationCenter {
            identity: IdentityCoordinator::new(Arc::clone(&connections)),
            connections,
            store,
            display,
            api: self.api,
            shut_down: AtomicBool::new(false),
        }
    }
}

/// Real-time notification delivery for one process.
#[derive(Debug)]
pub struct NotificationCenter {
    identity: IdentityCoordinator,
    connections: Arc<ConnectionManager>,
    store: Arc<Mutex<NotificationStore>>,
    display: Arc<DisplayQueue>,
    api: Arc<dyn NotificationApi>,
    shut_down: AtomicBool,
}

impl NotificationCenter {
    /// Start building a center over `transport` and `api`.
    pub fn builder(
        transport: Arc<dyn PushTransport>,
        api: Arc<dyn NotificationApi>,
    ) -> NotificationCenterBuilder {
        NotificationCenterBuilder {
            transport,
            api,
            storage: None,
            sink: None,
            toast_interval: DEFAULT_TOAST_INTERVAL,
            slot: None,
        }
    }

    /// Production wiring: HTTP API, Pusher transport, file-backed state.
    pub fn from_config(config: &Config, sink: Arc<dyn ToastSink>) -> anyhow::Result<Self> {
        let api = Arc::new(ApiClient::new(config.server_url.clone(), config.token.clone())?);
        let transport = Arc::new(PusherTransport::new(
            PusherConfig {
                host: config.push_host.clone(),
                app_key: config.push_key.clone(),
            },
            Arc::clone(&api) as Arc<dyn crate::api::ChannelAuthorizer>,
        ));
        let storage = FileStore::in_config_dir().context("Failed to open state storage")?;

        Ok(Self::builder(transport, api)
            .storage(Arc::new(storage))
            .toast_sink(sink)
            .toast_interval(config.toast_interval())
            .build())
    }

    /// Bind notifications to `(user_id, user_role)`.
    pub fn bind(&self, user_id: u64, user_role: &str) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.identity.bind(user_id, user_role)
    }

    /// Drop the current binding. Idempotent.
    pub fn unbind(&self) {
        self.identity.unbind();
    }

    /// Apply an identity lifecycle event.
    pub fn handle_identity_event(&self, event: IdentityEvent) {
        if self.shut_down.load(Ordering::Acquire) && matches!(event, IdentityEvent::SignedIn { .. }) {
            log::debug!("[Center] Ignoring sign-in after shutdown");
            return;
        }
        self.identity.handle(event);
    }

    /// The identity coordinator, for driving from an event stream.
    pub fn identity(&self) -> &IdentityCoordinator {
        &self.identity
    }

    /// Current notifications, most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Current unread counter.
    pub fn unread_count(&self) -> u64 {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unread_count()
    }

    /// Mark `id` read locally and acknowledge it to the server.
    ///
    /// Local state changes immediately and is not rolled back if the
    /// acknowledgement fails. Also the handler for a clicked toast.
    pub fn mark_as_read(&self, id: NotificationId) {
        let found = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_read(id);
        if !found {
            log::debug!("[Center] Marked unknown notification {} as read", id);
        }

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.mark_as_read(id).await {
                log::warn!("[Center] Failed to acknowledge read of {}: {:#}", id, e);
            }
        });
    }

    /// Current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.connections.phase()
    }

    /// Receiver that observes connection phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.connections.watch_phase()
    }

    /// Identity of the live binding, if any.
    pub fn current_binding(&self) -> Option<ConnectionBinding> {
        self.connections.current_binding()
    }

    /// Ids already offered for display, oldest first.
    pub fn shown_ids(&self) -> Vec<NotificationId> {
        self.display
            .dedup()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids()
            .collect()
    }

    /// Unbind and refuse further binds.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.connections.unbind();
        log::info!("[Center] Shut down");
    }
}
