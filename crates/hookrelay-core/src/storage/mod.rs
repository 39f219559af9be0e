//! Typed access to the key-value store backing all persisted state.
//!
//! The store itself is an external collaborator described by [`KvStore`]:
//! ordered keys, prefix scans and atomic single-key writes. The repositories
//! in this module translate between domain models and stored JSON values, one
//! repository per collection, each scoped to a namespace.
//!
//! All engine reads and writes go through these repositories. Nothing else
//! builds store keys.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

pub mod execution_units;
pub mod memory;
pub mod notifications;
pub mod postgres;
pub mod webhooks;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::{
    error::{CoreError, Result},
    models::{Namespace, NotificationId},
};

/// Boxed future returned by [`KvStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Logical collections kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Submitted notifications keyed by id.
    Notifications,
    /// Registered webhooks keyed by URL.
    Webhooks,
    /// Execution units keyed by notification id then webhook URL.
    ExecutionUnits,
}

impl Collection {
    /// Stable name used by persistent backends.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Webhooks => "webhooks",
            Self::ExecutionUnits => "execution_units",
        }
    }
}

/// Ordered, prefix-scannable key-value store.
///
/// Keys are sequences of string segments compared element-wise, so every key
/// sharing a prefix forms a contiguous range. Each operation is atomic for a
/// single key; no multi-key transactions are required.
pub trait KvStore: Send + Sync + 'static {
    /// Reads the value stored under `key`.
    fn get<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, Option<Value>>;

    /// Writes `value` under `key`, replacing any previous value.
    fn set<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
        value: Value,
    ) -> StoreFuture<'a, ()>;

    /// Removes `key`. Deleting a missing key is not an error.
    fn delete<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, ()>;

    /// Returns all values whose key starts with `prefix`, in key order.
    fn list<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        prefix: &'a [String],
    ) -> StoreFuture<'a, Vec<Value>>;
}

/// Container for all repositories over one store and one namespace.
#[derive(Clone)]
pub struct Storage {
    /// Repository for submitted notifications.
    pub notifications: Arc<notifications::Repository>,

    /// Repository for registered webhooks.
    pub webhooks: Arc<webhooks::Repository>,

    /// Repository for execution units.
    pub execution_units: Arc<execution_units::Repository>,

    namespace: Namespace,
}

impl Storage {
    /// Creates the repositories sharing `store`, all scoped to `namespace`.
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self {
            notifications: Arc::new(notifications::Repository::new(
                store.clone(),
                namespace.clone(),
            )),
            webhooks: Arc::new(webhooks::Repository::new(store.clone(), namespace.clone())),
            execution_units: Arc::new(execution_units::Repository::new(store, namespace.clone())),
            namespace,
        }
    }

    /// Returns the namespace every repository is scoped to.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Deletes a notification once no execution unit references it.
    ///
    /// Returns `true` if the notification was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if listing units or deleting the notification fails.
    pub async fn delete_notification_if_drained(&self, id: NotificationId) -> Result<bool> {
        if !self.execution_units.list_for_notification(id).await?.is_empty() {
            return Ok(false);
        }
        self.notifications.delete(id).await?;
        Ok(true)
    }
}

/// Decodes a list of stored values into models.
pub(crate) fn decode_all<T: serde::de::DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>> {
    values.into_iter().map(|v| serde_json::from_value(v).map_err(CoreError::from)).collect()
}
