//! Connection lifecycle manager.
//!
//! Owns the one live push connection for the process. A binding goes
//! through three phases:
//!
//! ```text
//!            bind()                 subscription_succeeded
//!   Unbound ────────► Binding ──────────────────────────► Subscribed
//!      ▲                 │                                     │
//!      │   subscription  │                                     │
//!      ├─────failed──────┘                                     │
//!      └────────────unbind() or transport dropped──────────────┘
//! ```
//!
//! A transport that dies during `Binding` also returns to `Unbound`.
//!
//! # Exclusivity
//!
//! A live connection holds a [`ConnectionLease`] from an [`ExclusiveSlot`].
//! The process-wide slot ([`ExclusiveSlot::process`]) admits one lease at a
//! time; `bind` always releases the previous lease before taking a new one.
//! Tests inject their own slot.
//!
//! # Liveness
//!
//! Every binding gets a fresh epoch. Async continuations (pushed events,
//! the reconciliation fetch) carry a [`BindingTicket`] and ask the
//! [`LivenessGuard`] whether it is still current before touching the store.
//! Tickets are checked and invalidated under the store lock, so a stale
//! continuation can never write after teardown cleared the store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};

use scopeguard::defer;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::NotificationApi;
use crate::display::DisplayQueue;
use crate::error::{Error, Result};
use crate::notification::ConnectionBinding;
use crate::router::ChannelRouter;
use crate::store::NotificationStore;
use crate::transport::{ConnectionCloser, PushTransport, TransportEvent, TransportState};

/// Lifecycle phase of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No binding.
    #[default]
    Unbound,
    /// Connection opened, waiting for the subscription to be confirmed.
    Binding,
    /// Subscription confirmed; events flow.
    Subscribed,
}

/// Admits at most one [`ConnectionLease`] at a time.
#[derive(Debug, Default)]
pub struct ExclusiveSlot {
    held: AtomicBool,
}

static PROCESS_SLOT: LazyLock<Arc<ExclusiveSlot>> = LazyLock::new(ExclusiveSlot::new);

impl ExclusiveSlot {
    /// A fresh, independent slot.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The slot shared by everything in this process.
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_SLOT)
    }

    /// Take the lease, failing if someone else holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Result<ConnectionLease> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_held| Error::ConnectionBusy)?;
        Ok(ConnectionLease {
            slot: Arc::clone(self),
        })
    }

    /// Whether a lease is currently outstanding.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of exclusive ownership of the live connection. Released on drop.
#[derive(Debug)]
pub struct ConnectionLease {
    slot: Arc<ExclusiveSlot>,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.slot.held.store(false, Ordering::Release);
    }
}

/// Identifies one binding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTicket {
    epoch: u64,
    binding: ConnectionBinding,
}

impl BindingTicket {
    /// The identity this ticket was issued for.
    pub fn binding(&self) -> &ConnectionBinding {
        &self.binding
    }

    /// Epoch the ticket was issued in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// "Is this binding still current?"
#[derive(Debug, Clone, Default)]
pub struct LivenessGuard {
    epoch: Arc<AtomicU64>,
}

impl LivenessGuard {
    /// Whether `ticket` belongs to the current binding.
    pub fn is_current(&self, ticket: &BindingTicket) -> bool {
        self.epoch.load(Ordering::Acquire) == ticket.epoch
    }

    /// Invalidate every outstanding ticket and return the new epoch.
    fn advance(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Invalidate outstanding tickets and issue one for `binding`.
    pub(crate) fn issue(&self, binding: ConnectionBinding) -> BindingTicket {
        BindingTicket {
            epoch: self.advance(),
            binding,
        }
    }
}

/// Everything a live binding owns.
#[derive(Debug)]
struct LiveConnection {
    ticket: BindingTicket,
    closer: ConnectionCloser,
    events_task: JoinHandle<()>,
    _lease: ConnectionLease,
}

#[derive(Debug)]
struct Inner {
    transport: Arc<dyn PushTransport>,
    api: Arc<dyn NotificationApi>,
    store: Arc<Mutex<NotificationStore>>,
    display: Arc<DisplayQueue>,
    slot: Arc<ExclusiveSlot>,
    guard: LivenessGuard,
    phase: watch::Sender<ConnectionPhase>,
    live: Mutex<Option<LiveConnection>>,
}

/// Owns the single live push connection.
///
/// Dropping the manager tears down any live connection.
#[derive(Debug)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create an unbound manager.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        api: Arc<dyn NotificationApi>,
        store: Arc<Mutex<NotificationStore>>,
        display: Arc<DisplayQueue>,
        slot: Arc<ExclusiveSlot>,
    ) -> Self {
        let (phase, _) = watch::channel(ConnectionPhase::Unbound);
        Self {
            inner: Arc::new(Inner {
                transport,
                api,
                store,
                display,
                slot,
                guard: LivenessGuard::default(),
                phase,
                live: Mutex::new(None),
            }),
        }
    }

    /// Bind the connection to `binding`.
    ///
    /// No-op if `binding` is already live. Otherwise tears down the current
    /// connection (if any), takes the lease, and opens a subscription to
    /// the binding's channel. Must be called from within a Tokio runtime.
    pub fn bind(&self, binding: ConnectionBinding) -> Result<()> {
        let inner = &self.inner;
        let mut live = inner.live.lock().unwrap_or_else(PoisonError::into_inner);

        if live.as_ref().is_some_and(|l| l.ticket.binding == binding) {
            log::debug!("[Connection] Already bound to {}, nothing to do", binding);
            return Ok(());
        }
        if let Some(previous) = live.take() {
            inner.teardown(previous);
        }

        let lease = inner.slot.try_acquire()?;
        let ticket = inner.start_epoch(binding);
        let channel = ticket.binding.channel_name();

        let connection = inner.transport.open(&channel).map_err(|e| {
            log::error!("[Connection] Failed to open channel {}: {:#}", channel, e);
            inner.guard.advance();
            Error::Transport(format!("{e:#}"))
        })?;
        inner.phase.send_replace(ConnectionPhase::Binding);
        log::info!("[Connection] Binding {} on {}", ticket.binding, channel);

        let (events, closer) = connection.into_parts();
        let router = ChannelRouter::new(
            Arc::clone(&inner.store),
            Arc::clone(&inner.display),
            inner.guard.clone(),
        );
        let events_task = tokio::spawn(drive_events(
            Arc::downgrade(inner),
            ticket.clone(),
            events,
            router,
        ));

        *live = Some(LiveConnection {
            ticket,
            closer,
            events_task,
            _lease: lease,
        });
        Ok(())
    }

    /// Tear down the live connection, if any. Always safe to call.
    pub fn unbind(&self) {
        let previous = self
            .inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(live) => self.inner.teardown(live),
            None => log::trace!("[Connection] Unbind while unbound"),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        *self.inner.phase.borrow()
    }

    /// Receiver that observes phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.inner.phase.subscribe()
    }

    /// Identity of the live binding, if any.
    pub fn current_binding(&self) -> Option<ConnectionBinding> {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|l| l.ticket.binding.clone())
    }

    /// Guard shared with the router and pending continuations.
    pub fn liveness(&self) -> &LivenessGuard {
        &self.inner.guard
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl Inner {
    /// Invalidate old tickets, clear per-identity state, and issue a ticket.
    fn start_epoch(&self, binding: ConnectionBinding) -> BindingTicket {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.clear();
        self.guard.issue(binding)
    }

    /// Release everything `live` owns. Never fails; local state is reset
    /// even if closing the transport misbehaves.
    fn teardown(&self, live: LiveConnection) {
        let LiveConnection {
            ticket,
            closer,
            events_task,
            _lease: lease,
        } = live;
        defer! {
            self.phase.send_replace(ConnectionPhase::Unbound);
        }

        {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            self.guard.advance();
            store.clear();
        }
        closer.close();
        events_task.abort();
        drop(lease);
        log::info!("[Connection] Unbound {}", ticket.binding);
    }

    /// Promote `ticket` to Subscribed if it is still the live binding.
    fn mark_subscribed(&self, ticket: &BindingTicket) -> bool {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.as_ref().is_some_and(|l| l.ticket == *ticket) {
            self.phase.send_replace(ConnectionPhase::Subscribed);
            true
        } else {
            false
        }
    }

    /// Drop the live binding if it is still `ticket`'s.
    fn release(&self, ticket: &BindingTicket) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.as_ref().is_some_and(|l| l.ticket == *ticket) {
            if let Some(current) = live.take() {
                self.teardown(current);
            }
        }
    }
}

/// Consume transport events for one binding.
///
/// Lifecycle signals drive the phase machine; channel messages go to the
/// router. Holds only a weak reference so dropping the manager ends it.
async fn drive_events(
    inner: Weak<Inner>,
    ticket: BindingTicket,
    mut events: mpsc::Receiver<TransportEvent>,
    router: ChannelRouter,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::StateChanged { previous, current } => {
                log::info!(
                    "[Connection] Transport {} -> {} for {}",
                    previous,
                    current,
                    ticket.binding
                );
                if matches!(current, TransportState::Disconnected | TransportState::Failed) {
                    release_dead(&inner, &ticket);
                    return;
                }
            }
            TransportEvent::SubscriptionSucceeded => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if inner.mark_subscribed(&ticket) {
                    log::info!("[Connection] Subscribed for {}", ticket.binding);
                    tokio::spawn(crate::store::reconcile(
                        Arc::clone(&inner.api),
                        Arc::clone(&inner.store),
                        inner.guard.clone(),
                        ticket.clone(),
                    ));
                }
            }
            TransportEvent::SubscriptionFailed(reason) => {
                log::error!(
                    "[Connection] Subscription failed for {}: {}",
                    ticket.binding,
                    reason
                );
                release_dead(&inner, &ticket);
                return;
            }
            TransportEvent::Message { event, data } => {
                router.route(&ticket, &event, data);
            }
        }
    }
    log::warn!("[Connection] Event stream ended for {}", ticket.binding);
    release_dead(&inner, &ticket);
}

/// Return to `Unbound` after the transport died under a live binding, so
/// the next bind for the same identity opens a fresh connection.
fn release_dead(inner: &Weak<Inner>, ticket: &BindingTicket) {
    if let Some(inner) = inner.upgrade() {
        inner.release(ticket);
    }
}
