//! Lifecycle hooks fired by the delivery worker.
//!
//! Callers observe delivery outcomes by implementing [`DeliveryHooks`]. Every
//! hook receives a snapshot of the execution unit at the moment of the
//! transition.
//!
//! ```text
//! ┌────────────────┐  on_success / on_error  ┌────────────────┐
//! │ DeliveryWorker │ ───────────────────────▶│ MulticastHooks │
//! │ (producer)     │      on_exhausted       │ (dispatcher)   │
//! └────────────────┘                         └────────────────┘
//!                                                    │
//!                                                    ▼
//!                                          caller subscribers
//! ```

use std::sync::Arc;

use crate::models::ExecutionUnit;

/// Callbacks for delivery lifecycle transitions.
///
/// All methods default to no-ops so implementors override only what they
/// need. Hooks cannot fail; an implementation that needs error handling must
/// do it internally. Delivery processing awaits each hook, so long-running
/// work should be handed off.
#[async_trait::async_trait]
pub trait DeliveryHooks: Send + Sync + std::fmt::Debug {
    /// Called once after a unit was delivered with HTTP 200 and removed.
    async fn on_success(&self, _unit: &ExecutionUnit) {}

    /// Called after each failed attempt that still has retries left.
    async fn on_error(&self, _unit: &ExecutionUnit) {}

    /// Called once when an exhausted unit is purged.
    async fn on_exhausted(&self, _unit: &ExecutionUnit) {}
}

/// Hooks that ignore every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHooks;

impl NoOpHooks {
    /// Creates a new no-op hook set.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DeliveryHooks for NoOpHooks {}

/// Forwards every callback to all registered subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastHooks {
    subscribers: Vec<Arc<dyn DeliveryHooks>>,
}

impl MulticastHooks {
    /// Creates a multicast hook set with no subscribers.
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    /// Adds a subscriber.
    pub fn add_subscriber(&mut self, hooks: Arc<dyn DeliveryHooks>) {
        self.subscribers.push(hooks);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait::async_trait]
impl DeliveryHooks for MulticastHooks {
    async fn on_success(&self, unit: &ExecutionUnit) {
        futures::future::join_all(self.subscribers.iter().map(|s| s.on_success(unit))).await;
    }

    async fn on_error(&self, unit: &ExecutionUnit) {
        futures::future::join_all(self.subscribers.iter().map(|s| s.on_error(unit))).await;
    }

    async fn on_exhausted(&self, unit: &ExecutionUnit) {
        futures::future::join_all(self.subscribers.iter().map(|s| s.on_exhausted(unit))).await;
    }
}
