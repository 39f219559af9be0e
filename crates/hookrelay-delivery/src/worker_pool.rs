//! Worker pool management with structured concurrency.
//!
//! Spawns a fixed number of delivery workers over one shared work queue and
//! stops them together through a cancellation token.

use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{DeliveryError, Result},
    queue::WorkReceiver,
    worker::{DeliveryWorker, EngineStats},
};

/// Pool of delivery workers consuming one work queue.
pub struct WorkerPool {
    worker: DeliveryWorker,
    receiver: WorkReceiver,
    worker_count: usize,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a new worker pool. Workers are not started until
    /// [`spawn_workers`](Self::spawn_workers).
    pub fn new(
        worker: DeliveryWorker,
        receiver: WorkReceiver,
        worker_count: usize,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            worker,
            receiver,
            worker_count,
            stats,
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Spawn all configured workers and begin processing.
    ///
    /// Returns immediately after spawning; workers run until the cancellation
    /// token fires.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the pool has no workers.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(DeliveryError::configuration("worker_count must be at least 1"));
        }

        info!(worker_count = self.worker_count, "spawning delivery workers");
        self.stats.write().await.active_workers = self.worker_count;

        for worker_id in 0..self.worker_count {
            let worker = self.worker.clone();
            let receiver = self.receiver.clone();
            let token = self.cancellation_token.clone();

            let handle = tokio::spawn(async move {
                worker.run(worker_id, receiver, token).await;
            });
            self.worker_handles.push(handle);
        }

        Ok(())
    }

    /// Gracefully shut down all workers, letting each finish its current
    /// task.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if the workers do not stop within `timeout`,
    /// or `WorkerPanic` if a worker task panicked.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let shutdown = async {
            let mut first_panic = None;
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    error!(worker_id, error = %join_error, "worker task panicked during shutdown");
                    first_panic.get_or_insert(DeliveryError::WorkerPanic {
                        worker_id,
                        error: join_error.to_string(),
                    });
                }
            }
            first_panic
        };

        let result = match tokio::time::timeout(timeout, shutdown).await {
            Ok(None) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic)) => Err(panic),
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        };

        self.stats.write().await.active_workers = 0;
        result
    }

    /// Number of spawned workers.
    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|h| !h.is_finished()).count();
        if active > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_workers = active,
                "worker pool dropped without shutdown_graceful, cancelling workers"
            );
            self.cancellation_token.cancel();
        }
    }
}
