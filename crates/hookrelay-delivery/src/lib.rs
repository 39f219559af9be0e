//! Webhook delivery engine with scheduled retries.
//!
//! Fans every submitted notification out to all registered webhooks and keeps
//! retrying failed deliveries on a fixed backoff schedule until they succeed
//! or the schedule is used up.
//!
//! # Architecture
//!
//! A poll loop scans the store for pending execution units and pushes them
//! onto a work queue consumed by a pool of delivery workers:
//!
//! 1. **Dispatch** - the dispatcher claims each unit in the in-flight guard
//! 2. **Deliver** - a worker POSTs the notification to the webhook
//! 3. **Settle** - success removes the unit; failure records the error and
//!    hands the unit to the retry queue for its backoff delay
//! 4. **Clean up** - a notification is removed with its last unit
//!
//! The guard keeps a unit claimed across backoff waits, so repeated scans
//! never start a second concurrent attempt for the same unit.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hookrelay_core::{storage::MemoryStore, NoOpHooks, RealClock};
//! use hookrelay_delivery::{ManagerConfig, WebhookManager};
//!
//! # async fn example() -> hookrelay_delivery::Result<()> {
//! let mut manager = WebhookManager::new(
//!     Arc::new(MemoryStore::new()),
//!     ManagerConfig::default(),
//!     Arc::new(RealClock::new()),
//!     Arc::new(NoOpHooks::new()),
//! )?;
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod inflight;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod worker;
pub mod worker_pool;

pub use error::{DeliveryError, Result};
pub use manager::{ManagerConfig, WebhookManager};
pub use retry::RetrySchedule;
pub use worker::{DeliveryOutcome, EngineStats};

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default pause between dispatch cycles in seconds.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
