//! Shared fakes for integration tests.
//!
//! `FakeTransport` hands the test the sending side of every opened
//! connection, `FakeApi` serves canned lists and records acknowledgements,
//! and `RecordingSink` captures toasts.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pushline::api::NotificationApi;
use pushline::transport::{PushConnection, PushTransport, TransportEvent};
use pushline::{
    ConnectionBinding, ConnectionPhase, ExclusiveSlot, Notification, NotificationCenter,
    NotificationId, ToastSink,
};
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn note(id: u64, event_type: &str, is_read: bool) -> Notification {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "event_type": event_type,
        "message": format!("notification {id}"),
        "is_read": is_read,
    }))
    .unwrap()
}

pub fn push_payload(id: u64, event_type: &str, is_read: bool) -> TransportEvent {
    TransportEvent::Message {
        event: "notification".to_string(),
        data: serde_json::to_value(note(id, event_type, is_read)).unwrap(),
    }
}

/// One `open()` call as seen by the fake.
#[derive(Debug, Clone)]
pub struct OpenedChannel {
    pub channel: String,
    pub events: mpsc::Sender<TransportEvent>,
    pub cancel: CancellationToken,
    /// Whether every earlier connection was already closed at open time.
    pub earlier_closed: bool,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    opened: Mutex<Vec<OpenedChannel>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> Vec<OpenedChannel> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last(&self) -> OpenedChannel {
        self.opened.lock().unwrap().last().cloned().expect("nothing opened")
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Forget the fake's own sender for connection `index`. Once the test
    /// drops its copies too, the event stream ends like a dropped socket.
    pub fn hang_up(&self, index: usize) {
        let (orphan, _) = mpsc::channel(1);
        self.opened.lock().unwrap()[index].events = orphan;
    }
}

impl PushTransport for FakeTransport {
    fn open(&self, channel_name: &str) -> anyhow::Result<PushConnection> {
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let mut opened = self.opened.lock().unwrap();
        let earlier_closed = opened.iter().all(|o| o.cancel.is_cancelled());
        opened.push(OpenedChannel {
            channel: channel_name.to_string(),
            events: tx,
            cancel: cancel.clone(),
            earlier_closed,
        });
        Ok(PushConnection::new(rx, cancel))
    }
}

#[derive(Debug, Default)]
pub struct FakeApi {
    lists: Mutex<HashMap<ConnectionBinding, Vec<Notification>>>,
    list_calls: Mutex<Vec<ConnectionBinding>>,
    acks: Mutex<Vec<NotificationId>>,
    fail_list: Mutex<bool>,
    fail_ack: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_list(&self, binding: ConnectionBinding, list: Vec<Notification>) {
        self.lists.lock().unwrap().insert(binding, list);
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn fail_ack(&self, fail: bool) {
        *self.fail_ack.lock().unwrap() = fail;
    }

    /// Hold list responses until the returned handle is notified.
    pub fn gate_lists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn list_calls(&self) -> Vec<ConnectionBinding> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<NotificationId> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationApi for FakeApi {
    async fn list_notifications(&self, binding: &ConnectionBinding) -> anyhow::Result<Vec<Notification>> {
        self.list_calls.lock().unwrap().push(binding.clone());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_list.lock().unwrap() {
            anyhow::bail!("list endpoint unavailable");
        }
        Ok(self.lists.lock().unwrap().get(binding).cloned().unwrap_or_default())
    }

    async fn mark_as_read(&self, id: NotificationId) -> anyhow::Result<()> {
        self.acks.lock().unwrap().push(id);
        if *self.fail_ack.lock().unwrap() {
            anyhow::bail!("ack endpoint unavailable");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<NotificationId>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shown(&self) -> Vec<u64> {
        self.shown.lock().unwrap().iter().map(|id| id.0).collect()
    }
}

impl ToastSink for RecordingSink {
    fn show(&self, toast: &Notification) {
        self.shown.lock().unwrap().push(toast.id);
    }
}

/// A center over fakes with its own exclusivity slot and a short toast interval.
pub struct Harness {
    pub center: NotificationCenter,
    pub transport: Arc<FakeTransport>,
    pub api: Arc<FakeApi>,
    pub sink: Arc<RecordingSink>,
    pub slot: Arc<ExclusiveSlot>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(pushline::storage::MemoryStore::new()))
    }

    pub fn with_storage(storage: Arc<dyn pushline::storage::KeyValueStore>) -> Self {
        let transport = FakeTransport::new();
        let api = FakeApi::new();
        let sink = RecordingSink::new();
        let slot = ExclusiveSlot::new();
        let center = NotificationCenter::builder(transport.clone(), api.clone())
            .storage(storage)
            .toast_sink(sink.clone())
            .toast_interval(Duration::from_millis(10))
            .slot(Arc::clone(&slot))
            .build();
        Self {
            center,
            transport,
            api,
            sink,
            slot,
        }
    }

    /// Bind and confirm the subscription, waiting for the initial reconcile.
    pub async fn bind_subscribed(&self, user_id: u64, user_role: &str) -> OpenedChannel {
        let calls_before = self.api.list_calls().len();
        self.center.bind(user_id, user_role).unwrap();
        let opened = self.transport.last();
        opened
            .events
            .send(TransportEvent::SubscriptionSucceeded)
            .await
            .unwrap();
        wait_for_phase(&mut self.center.watch_phase(), ConnectionPhase::Subscribed).await;
        eventually(|| self.api.list_calls().len() > calls_before).await;
        settle().await;
        opened
    }
}

pub async fn wait_for_phase(rx: &mut watch::Receiver<ConnectionPhase>, phase: ConnectionPhase) {
    tokio::time::timeout(WAIT, rx.wait_for(|p| *p == phase))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {phase:?}"))
        .unwrap();
}

/// Poll `condition` until it holds or the wait budget runs out.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {WAIT:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give spawned tasks a chance to run when asserting that nothing happens.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
