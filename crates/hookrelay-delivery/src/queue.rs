//! Work queue between the dispatcher and the delivery workers.
//!
//! The dispatcher pushes fresh tasks; the retry queue pushes tasks back once
//! their backoff delay has elapsed. Workers share one receiver, so each task
//! is handled by exactly one worker.
//!
//! ```text
//! ┌────────────┐  Fresh   ┌───────────┐  recv   ┌──────────────┐
//! │ Dispatcher │ ───────▶ │ WorkQueue │ ──────▶ │ WorkerPool   │
//! └────────────┘          └───────────┘         └──────────────┘
//!                               ▲  Retry               │
//!                               │                      ▼
//!                         ┌────────────┐  delay  ┌──────────────┐
//!                         │ RetryQueue │ ◀────── │ worker       │
//!                         └────────────┘         └──────────────┘
//! ```

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use hookrelay_core::{Clock, ExecutionUnit};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a worker should treat a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Discovered by a poll cycle. Units with a failure record wait out their
    /// backoff before the next attempt.
    Fresh,
    /// Backoff already elapsed; attempt immediately.
    Retry,
}

/// One unit of work for a delivery worker.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    /// Unit to deliver, as last observed.
    pub unit: ExecutionUnit,
    /// Whether this is a fresh dispatch or a scheduled retry.
    pub mode: DeliveryMode,
}

impl DeliveryTask {
    /// Task for a unit discovered by the dispatcher.
    pub fn fresh(unit: ExecutionUnit) -> Self {
        Self { unit, mode: DeliveryMode::Fresh }
    }

    /// Task for a unit whose backoff has elapsed.
    pub fn retry(unit: ExecutionUnit) -> Self {
        Self { unit, mode: DeliveryMode::Retry }
    }
}

/// Creates an unbounded work queue.
pub fn work_queue() -> (WorkSender, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkSender { tx }, WorkReceiver { rx: Arc::new(Mutex::new(rx)) })
}

/// Producer half of the work queue.
#[derive(Debug, Clone)]
pub struct WorkSender {
    tx: mpsc::UnboundedSender<DeliveryTask>,
}

impl WorkSender {
    /// Enqueues a task. Returns the task back if every receiver is gone.
    pub fn enqueue(&self, task: DeliveryTask) -> Result<(), DeliveryTask> {
        self.tx.send(task).map_err(|e| e.0)
    }
}

/// Consumer half of the work queue, shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<DeliveryTask>>>,
}

impl WorkReceiver {
    /// Waits for the next task. Returns `None` once all senders are dropped.
    pub async fn recv(&self) -> Option<DeliveryTask> {
        self.rx.lock().await.recv().await
    }

    /// Takes a task if one is ready.
    pub async fn try_recv(&self) -> Option<DeliveryTask> {
        self.rx.lock().await.try_recv().ok()
    }
}

/// Defers tasks by their backoff delay, then re-enqueues them as retries.
///
/// Each pending retry is a clock-driven timer task, so neither the worker that
/// scheduled it nor the dispatcher waits on it. Pending retries are dropped
/// when the cancellation token fires; their units are picked up again by the
/// next process to poll the store.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    sender: WorkSender,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl RetryQueue {
    /// Creates a retry queue feeding `sender`.
    pub fn new(
        sender: WorkSender,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { sender, clock, cancellation_token, pending: Arc::new(AtomicUsize::new(0)) }
    }

    /// Re-enqueues `unit` in retry mode after `delay`.
    pub fn schedule(&self, unit: ExecutionUnit, delay: Duration) {
        let sender = self.sender.clone();
        let clock = self.clock.clone();
        let token = self.cancellation_token.clone();
        let pending = self.pending.clone();
        pending.fetch_add(1, Ordering::AcqRel);

        debug!(
            notification_id = %unit.notification_id,
            webhook = %unit.webhook,
            delay_ms = delay.as_millis(),
            "retry scheduled"
        );

        tokio::spawn(async move {
            tokio::select! {
                () = clock.sleep(delay) => {
                    if let Err(task) = sender.enqueue(DeliveryTask::retry(unit)) {
                        warn!(
                            notification_id = %task.unit.notification_id,
                            webhook = %task.unit.webhook,
                            "work queue closed, dropping retry"
                        );
                    }
                }
                () = token.cancelled() => {
                    debug!(
                        notification_id = %unit.notification_id,
                        webhook = %unit.webhook,
                        "retry dropped on shutdown"
                    );
                }
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Number of retries still waiting for their delay.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
