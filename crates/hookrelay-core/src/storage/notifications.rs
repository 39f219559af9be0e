//! Repository for submitted notifications.
//!
//! Notifications are keyed by id and never modified after submission; the
//! delivery engine only reads them to build request bodies and deletes them
//! once their last execution unit is gone.

use std::sync::Arc;

use super::{decode_all, Collection, KvStore};
use crate::{
    error::{CoreError, Result},
    models::{Namespace, Notification, NotificationId},
};

/// Repository for notification records.
pub struct Repository {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Finds a notification by id.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the stored value is malformed.
    pub async fn get(&self, id: NotificationId) -> Result<Option<Notification>> {
        let key = [id.to_string()];
        let value =
            self.store.get(Collection::Notifications, self.namespace.as_str(), &key).await?;
        value.map(serde_json::from_value).transpose().map_err(CoreError::from)
    }

    /// Lists every notification in the namespace.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or a stored value is malformed.
    pub async fn list(&self) -> Result<Vec<Notification>> {
        let values =
            self.store.list(Collection::Notifications, self.namespace.as_str(), &[]).await?;
        decode_all(values)
    }

    /// Stores a notification, replacing any record with the same id.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn put(&self, notification: &Notification) -> Result<()> {
        let key = [notification.id.to_string()];
        let value = serde_json::to_value(notification)?;
        self.store.set(Collection::Notifications, self.namespace.as_str(), &key, value).await
    }

    /// Deletes a notification. Its execution units are left in place.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, id: NotificationId) -> Result<()> {
        let key = [id.to_string()];
        self.store.delete(Collection::Notifications, self.namespace.as_str(), &key).await
    }
}
