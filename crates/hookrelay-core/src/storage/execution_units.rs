//! Repository for execution units.
//!
//! Units are keyed by `[notification_id, webhook]`, which makes the pair
//! unique and turns "all units of one notification" into a prefix scan.
//! Writes always replace the whole record; callers read, modify and write
//! back.

use std::sync::Arc;

use super::{decode_all, Collection, KvStore};
use crate::{
    error::{CoreError, Result},
    models::{ExecutionUnit, Namespace, NotificationId, UnitKey},
};

/// Repository for execution unit records.
pub struct Repository {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Finds a unit by its identity.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the stored value is malformed.
    pub async fn get(&self, key: &UnitKey) -> Result<Option<ExecutionUnit>> {
        let path = store_key(key);
        let value =
            self.store.get(Collection::ExecutionUnits, self.namespace.as_str(), &path).await?;
        value.map(serde_json::from_value).transpose().map_err(CoreError::from)
    }

    /// Lists every unit in the namespace.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or a stored value is malformed.
    pub async fn list(&self) -> Result<Vec<ExecutionUnit>> {
        let values =
            self.store.list(Collection::ExecutionUnits, self.namespace.as_str(), &[]).await?;
        decode_all(values)
    }

    /// Lists the units belonging to one notification.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or a stored value is malformed.
    pub async fn list_for_notification(&self, id: NotificationId) -> Result<Vec<ExecutionUnit>> {
        let prefix = [id.to_string()];
        let values =
            self.store.list(Collection::ExecutionUnits, self.namespace.as_str(), &prefix).await?;
        decode_all(values)
    }

    /// Lists the units that carry a failure record.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or a stored value is malformed.
    pub async fn list_failed(&self) -> Result<Vec<ExecutionUnit>> {
        Ok(self.list().await?.into_iter().filter(ExecutionUnit::has_failed).collect())
    }

    /// Stores a unit, replacing any unit with the same identity.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn put(&self, unit: &ExecutionUnit) -> Result<()> {
        let path = store_key(&unit.key());
        let value = serde_json::to_value(unit)?;
        self.store.set(Collection::ExecutionUnits, self.namespace.as_str(), &path, value).await
    }

    /// Deletes a unit.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, key: &UnitKey) -> Result<()> {
        let path = store_key(key);
        self.store.delete(Collection::ExecutionUnits, self.namespace.as_str(), &path).await
    }
}

fn store_key(key: &UnitKey) -> [String; 2] {
    [key.notification_id.to_string(), key.webhook.as_str().to_string()]
}
