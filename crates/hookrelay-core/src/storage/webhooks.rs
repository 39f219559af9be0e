//! Repository for registered webhooks.
//!
//! A webhook is stored under its own URL, so registering the same URL twice
//! leaves a single record.

use std::sync::Arc;

use super::{decode_all, Collection, KvStore};
use crate::{
    error::{CoreError, Result},
    models::{Namespace, WebhookUrl},
};

/// Repository for webhook registrations.
pub struct Repository {
    store: Arc<dyn KvStore>,
    namespace: Namespace,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(store: Arc<dyn KvStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Finds a registered webhook by URL.
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the stored value is malformed.
    pub async fn get(&self, url: &WebhookUrl) -> Result<Option<WebhookUrl>> {
        let key = [url.as_str().to_string()];
        let value = self.store.get(Collection::Webhooks, self.namespace.as_str(), &key).await?;
        value.map(serde_json::from_value).transpose().map_err(CoreError::from)
    }

    /// Lists every registered webhook in URL order.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or a stored value is malformed.
    pub async fn list(&self) -> Result<Vec<WebhookUrl>> {
        let values = self.store.list(Collection::Webhooks, self.namespace.as_str(), &[]).await?;
        decode_all(values)
    }

    /// Registers a webhook.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn put(&self, url: &WebhookUrl) -> Result<()> {
        let key = [url.as_str().to_string()];
        let value = serde_json::to_value(url)?;
        self.store.set(Collection::Webhooks, self.namespace.as_str(), &key, value).await
    }

    /// Removes a webhook registration. Existing execution units are left in
    /// place and reaped as orphans when next dispatched.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, url: &WebhookUrl) -> Result<()> {
        let key = [url.as_str().to_string()];
        self.store.delete(Collection::Webhooks, self.namespace.as_str(), &key).await
    }
}
