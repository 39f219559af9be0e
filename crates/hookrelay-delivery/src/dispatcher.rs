//! Poll loop that discovers pending execution units.
//!
//! Each cycle lists every unit in the namespace and enqueues a fresh task for
//! each one not already in flight. The next cycle starts `poll_interval` after
//! the previous one finished, so slow listings stretch the period instead of
//! overlapping.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{storage::Storage, Clock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    inflight::InFlightGuard,
    queue::{DeliveryTask, WorkSender},
};

/// Periodic scanner feeding the work queue.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Storage,
    guard: Arc<InFlightGuard>,
    sender: WorkSender,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over `storage` feeding `sender`.
    pub fn new(
        storage: Storage,
        guard: Arc<InFlightGuard>,
        sender: WorkSender,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self { storage, guard, sender, clock, poll_interval }
    }

    /// Runs cycles until cancelled. A failed cycle is logged and the loop
    /// carries on.
    pub async fn run(&self, token: CancellationToken) {
        info!(
            namespace = %self.storage.namespace(),
            poll_interval_ms = self.poll_interval.as_millis(),
            "dispatcher starting"
        );

        loop {
            match self.run_cycle().await {
                Ok(dispatched) if dispatched > 0 => debug!(dispatched, "dispatch cycle completed"),
                Ok(_) => {},
                Err(error) => error!(error = %error, "dispatch cycle failed"),
            }

            tokio::select! {
                () = self.clock.sleep(self.poll_interval) => {}
                () = token.cancelled() => break,
            }
        }

        info!("dispatcher stopped");
    }

    /// Runs one scan and returns how many units were enqueued.
    ///
    /// # Errors
    ///
    /// Returns error if listing execution units fails.
    pub async fn run_cycle(&self) -> Result<usize> {
        let units = self.storage.execution_units.list().await?;
        let mut dispatched = 0;

        for unit in units {
            let key = unit.key();
            if !self.guard.try_acquire(&key).await {
                continue;
            }

            if self.sender.enqueue(DeliveryTask::fresh(unit)).is_err() {
                warn!("work queue closed, stopping dispatch cycle");
                self.guard.release(&key).await;
                break;
            }
            dispatched += 1;
        }

        Ok(dispatched)
    }
}
