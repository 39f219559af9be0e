//! In-memory store for tests and single-process deployments.
//!
//! Keeps every collection in one ordered map so prefix scans are plain range
//! walks. Supports injecting a failure into the next operation to exercise
//! storage error handling without a database.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{Collection, KvStore, StoreFuture};
use crate::error::{CoreError, Result};

type EntryKey = (Collection, String, Vec<String>);

/// Ordered in-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<EntryKey, Value>>,
    injected_failure: RwLock<Option<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next store operation fail with a database error.
    pub async fn inject_failure(&self, message: impl Into<String>) {
        *self.injected_failure.write().await = Some(message.into());
    }

    /// Number of entries held in `collection` across all namespaces.
    pub async fn entry_count(&self, collection: Collection) -> usize {
        self.entries.read().await.keys().filter(|(c, _, _)| *c == collection).count()
    }

    async fn check_injected_failure(&self) -> Result<()> {
        match self.injected_failure.write().await.take() {
            Some(message) => Err(CoreError::Database(message)),
            None => Ok(()),
        }
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            self.check_injected_failure().await?;
            let entry = (collection, namespace.to_string(), key.to_vec());
            Ok(self.entries.read().await.get(&entry).cloned())
        })
    }

    fn set<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
        value: Value,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_injected_failure().await?;
            self.entries
                .write()
                .await
                .insert((collection, namespace.to_string(), key.to_vec()), value);
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        key: &'a [String],
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_injected_failure().await?;
            self.entries.write().await.remove(&(collection, namespace.to_string(), key.to_vec()));
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        collection: Collection,
        namespace: &'a str,
        prefix: &'a [String],
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(async move {
            self.check_injected_failure().await?;
            let entries = self.entries.read().await;
            let start = (collection, namespace.to_string(), prefix.to_vec());
            let values = entries
                .range(start..)
                .take_while(|((c, ns, key), _)| {
                    *c == collection && ns.as_str() == namespace && key.starts_with(prefix)
                })
                .map(|(_, value)| value.clone())
                .collect();
            Ok(values)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_string()).collect()
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = MemoryStore::new();
        let k = key(&["a"]);
        store.set(Collection::Webhooks, "ns", &k, json!(1)).await.unwrap();
        store.set(Collection::Webhooks, "ns", &k, json!(2)).await.unwrap();

        assert_eq!(store.get(Collection::Webhooks, "ns", &k).await.unwrap(), Some(json!(2)));
        assert_eq!(store.entry_count(Collection::Webhooks).await, 1);
    }

    #[tokio::test]
    async fn list_scans_prefix_in_key_order() {
        let store = MemoryStore::new();
        for (parts, value) in [
            (["n2", "b"], 4),
            (["n1", "b"], 2),
            (["n1", "a"], 1),
            (["n10", "a"], 3),
        ] {
            store.set(Collection::ExecutionUnits, "ns", &key(&parts), json!(value)).await.unwrap();
        }

        let n1 = store.list(Collection::ExecutionUnits, "ns", &key(&["n1"])).await.unwrap();
        assert_eq!(n1, vec![json!(1), json!(2)]);

        let all = store.list(Collection::ExecutionUnits, "ns", &[]).await.unwrap();
        assert_eq!(all, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn namespaces_and_collections_are_isolated() {
        let store = MemoryStore::new();
        let k = key(&["x"]);
        store.set(Collection::Webhooks, "one", &k, json!("one")).await.unwrap();
        store.set(Collection::Webhooks, "two", &k, json!("two")).await.unwrap();
        store.set(Collection::Notifications, "one", &k, json!("n")).await.unwrap();

        let listed = store.list(Collection::Webhooks, "one", &[]).await.unwrap();
        assert_eq!(listed, vec![json!("one")]);

        store.delete(Collection::Webhooks, "one", &k).await.unwrap();
        assert!(store.get(Collection::Webhooks, "one", &k).await.unwrap().is_none());
        assert!(store.get(Collection::Webhooks, "two", &k).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn injected_failure_hits_next_operation_only() {
        let store = MemoryStore::new();
        store.inject_failure("disk on fire").await;

        let err = store.list(Collection::Webhooks, "ns", &[]).await.unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
        assert!(store.list(Collection::Webhooks, "ns", &[]).await.is_ok());
    }
}
