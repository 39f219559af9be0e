//! Shared fixtures for delivery integration tests.
//!
//! Wires a worker, dispatcher and retry queue over an in-memory store and a
//! virtual clock, without spawning the worker pool, so tests can step tasks
//! through the state machine one at a time.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use hookrelay_core::{
    storage::{Collection, KvStore, MemoryStore, Storage, StoreFuture},
    Clock, CoreError, DeliveryHooks, ExecutionUnit, Namespace, NewNotification, Notification,
    NotificationId, TestClock, WebhookUrl,
};
use serde_json::Value;
use hookrelay_delivery::{
    client::{ClientConfig, DeliveryClient},
    dispatcher::Dispatcher,
    inflight::InFlightGuard,
    queue::{work_queue, DeliveryTask, RetryQueue, WorkReceiver},
    worker::{DeliveryPolicy, DeliveryWorker, EngineStats},
    RetrySchedule,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Hooks that remember every unit they were called with.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub successes: Mutex<Vec<ExecutionUnit>>,
    pub errors: Mutex<Vec<ExecutionUnit>>,
    pub exhausted: Mutex<Vec<ExecutionUnit>>,
}

impl RecordingHooks {
    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn exhausted_count(&self) -> usize {
        self.exhausted.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DeliveryHooks for RecordingHooks {
    async fn on_success(&self, unit: &ExecutionUnit) {
        self.successes.lock().unwrap().push(unit.clone());
    }

    async fn on_error(&self, unit: &ExecutionUnit) {
        self.errors.lock().unwrap().push(unit.clone());
    }

    async fn on_exhausted(&self, unit: &ExecutionUnit) {
        self.exhausted.lock().unwrap().push(unit.clone());
    }
}

/// Store that can fail the per-notification unit scan used by drained
/// cleanup while every other operation goes to the inner store.
#[derive(Debug)]
pub struct FailingScanStore {
    inner: Arc<MemoryStore>,
    scan_failures: AtomicUsize,
}

impl FailingScanStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, scan_failures: AtomicUsize::new(0) }
    }

    /// Fails the next `count` unit listings scoped to one notification.
    pub fn fail_notification_scans(&self, count: usize) {
        self.scan_failures.store(count, Ordering::SeqCst);
    }
}

impl KvStore for FailingScanStore {
    fn get<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, Option<Value>> {
        self.inner.get(collection, namespace, key)
    }

    fn set<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
        value: Value,
    ) -> StoreFuture<'a, ()> {
        self.inner.set(collection, namespace, key, value)
    }

    fn delete<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, ()> {
        self.inner.delete(collection, namespace, key)
    }

    fn list<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        prefix: &'a [String],
    ) -> StoreFuture<'a, Vec<Value>> {
        let scoped_unit_scan = collection == Collection::ExecutionUnits && !prefix.is_empty();
        if scoped_unit_scan
            && self
                .scan_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Box::pin(async {
                Err(CoreError::Database("unit scan unavailable".to_string()))
            });
        }
        self.inner.list(collection, namespace, prefix)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub scans: Arc<FailingScanStore>,
    pub storage: Storage,
    pub guard: Arc<InFlightGuard>,
    pub worker: DeliveryWorker,
    pub dispatcher: Dispatcher,
    pub receiver: WorkReceiver,
    pub retries: RetryQueue,
    pub clock: TestClock,
    pub hooks: Arc<RecordingHooks>,
    pub stats: Arc<RwLock<EngineStats>>,
}

pub struct HarnessBuilder {
    schedule: RetrySchedule,
    delete_on_exhaustion: bool,
    timeout: Duration,
}

impl HarnessBuilder {
    pub fn schedule_secs(mut self, delays: &[u64]) -> Self {
        self.schedule =
            RetrySchedule::from_delays(delays.iter().map(|s| Duration::from_secs(*s)).collect())
                .unwrap();
        self
    }

    pub fn delete_on_exhaustion(mut self) -> Self {
        self.delete_on_exhaustion = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let scans = Arc::new(FailingScanStore::new(store.clone()));
        let storage = Storage::new(scans.clone(), Namespace::default());
        let clock = TestClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let guard = Arc::new(InFlightGuard::new());
        let hooks = Arc::new(RecordingHooks::default());
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let (sender, receiver) = work_queue();
        let retries = RetryQueue::new(sender.clone(), shared_clock.clone(), CancellationToken::new());

        let client = DeliveryClient::new(ClientConfig { timeout: self.timeout, ..Default::default() })
            .unwrap();
        let worker = DeliveryWorker::new(
            storage.clone(),
            Arc::new(client),
            guard.clone(),
            retries.clone(),
            DeliveryPolicy {
                retry_schedule: self.schedule,
                delete_on_exhaustion: self.delete_on_exhaustion,
            },
            hooks.clone(),
            stats.clone(),
            shared_clock.clone(),
        );
        let dispatcher = Dispatcher::new(
            storage.clone(),
            guard.clone(),
            sender,
            shared_clock,
            Duration::from_secs(10),
        );

        Harness {
            store,
            scans,
            storage,
            guard,
            worker,
            dispatcher,
            receiver,
            retries,
            clock,
            hooks,
            stats,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        schedule: RetrySchedule::default(),
        delete_on_exhaustion: false,
        timeout: Duration::from_secs(5),
    }
}

impl Harness {
    /// Registers `urls` and stores one notification fanned out to all of
    /// them.
    pub async fn seed(&self, urls: &[String]) -> Notification {
        let webhooks: Vec<WebhookUrl> = urls.iter().map(|u| WebhookUrl::parse(u).unwrap()).collect();
        for webhook in &webhooks {
            self.storage.webhooks.put(webhook).await.unwrap();
        }

        let notification = NewNotification::new("order.created")
            .with_extra(serde_json::json!({"order_id": 42}))
            .into_notification(NotificationId::new(), self.clock.now_utc());
        self.storage.notifications.put(&notification).await.unwrap();

        for webhook in webhooks {
            self.storage
                .execution_units
                .put(&ExecutionUnit::new(notification.id, webhook))
                .await
                .unwrap();
        }
        notification
    }

    /// Waits for the next task on the work queue.
    pub async fn next_task(&self) -> DeliveryTask {
        tokio::time::timeout(Duration::from_secs(5), self.receiver.recv())
            .await
            .expect("no task arrived on the work queue")
            .unwrap()
    }

    /// Runs one dispatch cycle and returns the enqueued tasks.
    pub async fn dispatch(&self) -> Vec<DeliveryTask> {
        self.dispatcher.run_cycle().await.unwrap();
        let mut tasks = Vec::new();
        while let Some(task) = self.receiver.try_recv().await {
            tasks.push(task);
        }
        tasks
    }

    pub async fn units(&self) -> Vec<ExecutionUnit> {
        self.storage.execution_units.list().await.unwrap()
    }
}
