//! Delivery worker: one attempt for one execution unit.
//!
//! Each task moves its unit through the delivery state machine:
//!
//! 1. **Lookup** - resolve the webhook and notification; a unit referencing
//!    either missing record is orphaned and removed.
//! 2. **Backoff** - a fresh task for a unit that already failed is deferred by
//!    its scheduled delay and comes back as a retry.
//! 3. **Attempt** - POST the notification. HTTP 200 removes the unit; any
//!    other outcome records the failure and either schedules a retry or
//!    declares the unit exhausted.
//!
//! The in-flight marker for the unit stays set while a retry is pending and,
//! when exhausted units are kept, forever. Every other outcome releases it.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{
    storage::Storage, Clock, CoreError, DeliveryHooks, ExecutionUnit, Notification, UnitKey,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::DeliveryClient,
    error::{DeliveryError, Result},
    inflight::InFlightGuard,
    queue::{DeliveryMode, DeliveryTask, RetryQueue, WorkReceiver},
    retry::RetrySchedule,
};

/// Statistics for delivery engine monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Number of running delivery workers.
    pub active_workers: usize,
    /// Tasks processed since startup.
    pub tasks_processed: u64,
    /// Units delivered with HTTP 200.
    pub delivered: u64,
    /// Failed delivery attempts.
    pub failed_attempts: u64,
    /// Units that used up the retry schedule.
    pub exhausted: u64,
    /// Units removed because their webhook or notification was gone.
    pub orphaned: u64,
    /// Worker runs aborted by a storage error.
    pub aborted: u64,
    /// HTTP requests currently outstanding.
    pub in_flight_attempts: u64,
}

/// Terminal result of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered 200; the unit was removed.
    Delivered,
    /// Webhook or notification was missing; the unit was removed.
    Orphaned,
    /// Unit already carried a failure; the next attempt waits `delay`.
    Deferred {
        /// Backoff before the retry
        delay: Duration,
    },
    /// Attempt failed and a retry was scheduled.
    Retrying {
        /// Failed attempts so far
        attempts: u32,
        /// Backoff before the retry
        delay: Duration,
    },
    /// Attempt failed and the schedule is used up.
    Exhausted {
        /// Whether the unit was removed
        deleted: bool,
    },
    /// A storage error interrupted the run; the unit is left for the next
    /// poll cycle.
    Aborted,
}

/// Per-engine delivery settings consulted by every worker.
#[derive(Debug, Clone, Default)]
pub struct DeliveryPolicy {
    /// Backoff table and exhaustion threshold.
    pub retry_schedule: RetrySchedule,
    /// Remove units that used up the schedule.
    pub delete_on_exhaustion: bool,
}

/// Executes delivery tasks. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DeliveryWorker {
    storage: Storage,
    client: Arc<DeliveryClient>,
    guard: Arc<InFlightGuard>,
    retries: RetryQueue,
    policy: Arc<DeliveryPolicy>,
    hooks: Arc<dyn DeliveryHooks>,
    stats: Arc<RwLock<EngineStats>>,
    clock: Arc<dyn Clock>,
}

impl DeliveryWorker {
    /// Creates a new delivery worker.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        client: Arc<DeliveryClient>,
        guard: Arc<InFlightGuard>,
        retries: RetryQueue,
        policy: DeliveryPolicy,
        hooks: Arc<dyn DeliveryHooks>,
        stats: Arc<RwLock<EngineStats>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, client, guard, retries, policy: Arc::new(policy), hooks, stats, clock }
    }

    /// Takes tasks from `receiver` until cancelled or the queue closes.
    pub async fn run(&self, worker_id: usize, receiver: WorkReceiver, token: CancellationToken) {
        debug!(worker_id, "delivery worker starting");

        loop {
            let task = tokio::select! {
                task = receiver.recv() => task,
                () = token.cancelled() => break,
            };
            let Some(task) = task else {
                debug!(worker_id, "work queue closed");
                break;
            };

            let outcome = self.process(task).await;
            debug!(worker_id, ?outcome, "task finished");
        }

        debug!(worker_id, "delivery worker stopped");
    }

    /// Runs one task to its outcome. Never fails: storage errors are logged,
    /// the unit's marker is released, and the run reports `Aborted`.
    pub async fn process(&self, task: DeliveryTask) -> DeliveryOutcome {
        let key = task.unit.key();

        let outcome = match self.try_process(task).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    notification_id = %key.notification_id,
                    webhook = %key.webhook,
                    error = %error,
                    "delivery run aborted"
                );
                self.guard.release(&key).await;
                DeliveryOutcome::Aborted
            },
        };

        self.record_outcome(&outcome).await;
        outcome
    }

    async fn try_process(&self, task: DeliveryTask) -> Result<DeliveryOutcome> {
        let DeliveryTask { unit, mode } = task;

        let webhook = self.storage.webhooks.get(&unit.webhook).await?;
        let notification = self.storage.notifications.get(unit.notification_id).await?;
        let (Some(_), Some(notification)) = (webhook, notification) else {
            return self.reap_orphan(&unit).await;
        };

        if unit.has_failed() && mode == DeliveryMode::Fresh {
            let delay = self.policy.retry_schedule.delay_for(unit.attempts());
            debug!(
                notification_id = %unit.notification_id,
                webhook = %unit.webhook,
                attempts = unit.attempts(),
                delay_ms = delay.as_millis(),
                "deferring previously failed unit"
            );
            self.retries.schedule(unit, delay);
            return Ok(DeliveryOutcome::Deferred { delay });
        }

        match self.attempt(&unit, &notification).await {
            Ok(()) => self.complete(unit).await,
            Err(failure) if failure.is_delivery_failure() => self.fail(unit, &failure).await,
            Err(error) => Err(error),
        }
    }

    /// Performs the HTTP attempt. Anything other than a 200 response comes
    /// back as an error; only delivery failures count against the schedule.
    async fn attempt(&self, unit: &ExecutionUnit, notification: &Notification) -> Result<()> {
        let body =
            serde_json::to_vec(notification).map_err(|e| DeliveryError::from(CoreError::from(e)))?;

        self.stats.write().await.in_flight_attempts += 1;
        let result = self.client.deliver(unit.webhook.as_str(), body).await;
        self.stats.write().await.in_flight_attempts -= 1;

        match result? {
            response if response.is_delivered() => Ok(()),
            response => Err(response.into_error()),
        }
    }

    async fn complete(&self, unit: ExecutionUnit) -> Result<DeliveryOutcome> {
        let key = unit.key();
        self.remove_unit(&key).await?;
        self.guard.release(&key).await;

        info!(
            notification_id = %unit.notification_id,
            webhook = %unit.webhook,
            attempts = unit.attempts(),
            "webhook delivered"
        );
        self.hooks.on_success(&unit).await;
        Ok(DeliveryOutcome::Delivered)
    }

    async fn fail(&self, mut unit: ExecutionUnit, failure: &DeliveryError) -> Result<DeliveryOutcome> {
        let attempts = unit.record_failure(failure.to_string(), self.clock.now_utc());
        self.storage.execution_units.put(&unit).await?;
        self.stats.write().await.failed_attempts += 1;

        if !self.policy.retry_schedule.is_exhausted(attempts) {
            let delay = self.policy.retry_schedule.delay_for(attempts);
            warn!(
                notification_id = %unit.notification_id,
                webhook = %unit.webhook,
                attempts,
                delay_ms = delay.as_millis(),
                error = %failure,
                "delivery attempt failed, retry scheduled"
            );
            self.hooks.on_error(&unit).await;
            self.retries.schedule(unit, delay);
            return Ok(DeliveryOutcome::Retrying { attempts, delay });
        }

        if !self.policy.delete_on_exhaustion {
            // Marker stays set so the dispatcher never picks the unit up again.
            error!(
                notification_id = %unit.notification_id,
                webhook = %unit.webhook,
                attempts,
                error = %failure,
                "retry schedule exhausted, keeping failed unit"
            );
            return Ok(DeliveryOutcome::Exhausted { deleted: false });
        }

        let key = unit.key();
        self.remove_unit(&key).await?;
        self.guard.release(&key).await;

        error!(
            notification_id = %unit.notification_id,
            webhook = %unit.webhook,
            attempts,
            error = %failure,
            "retry schedule exhausted, unit removed"
        );
        self.hooks.on_exhausted(&unit).await;
        Ok(DeliveryOutcome::Exhausted { deleted: true })
    }

    async fn reap_orphan(&self, unit: &ExecutionUnit) -> Result<DeliveryOutcome> {
        let key = unit.key();
        self.remove_unit(&key).await?;
        self.guard.release(&key).await;

        info!(
            notification_id = %unit.notification_id,
            webhook = %unit.webhook,
            "removed orphaned execution unit"
        );
        Ok(DeliveryOutcome::Orphaned)
    }

    /// Deletes a unit, then its notification once no unit references it.
    ///
    /// Only the unit delete can fail the run. Once the unit is gone the
    /// outcome is settled, so a failed notification cleanup is logged and
    /// left for the next removal of a sibling unit or a caller delete.
    async fn remove_unit(&self, key: &UnitKey) -> Result<()> {
        self.storage.execution_units.delete(key).await?;

        match self.storage.delete_notification_if_drained(key.notification_id).await {
            Ok(true) => {
                debug!(notification_id = %key.notification_id, "notification drained and removed");
            },
            Ok(false) => {},
            Err(error) => {
                warn!(
                    notification_id = %key.notification_id,
                    error = %error,
                    "failed to clean up drained notification"
                );
            },
        }
        Ok(())
    }

    async fn record_outcome(&self, outcome: &DeliveryOutcome) {
        let mut stats = self.stats.write().await;
        stats.tasks_processed += 1;
        match outcome {
            DeliveryOutcome::Delivered => stats.delivered += 1,
            DeliveryOutcome::Orphaned => stats.orphaned += 1,
            DeliveryOutcome::Exhausted { .. } => stats.exhausted += 1,
            DeliveryOutcome::Aborted => stats.aborted += 1,
            DeliveryOutcome::Deferred { .. } | DeliveryOutcome::Retrying { .. } => {},
        }
    }
}
