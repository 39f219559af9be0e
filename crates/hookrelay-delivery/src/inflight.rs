//! Process-local guard against concurrent processing of one execution unit.
//!
//! A key is held from the moment the dispatcher claims a unit until the
//! worker reaches a terminal outcome, including any backoff wait in between.
//! The guard is not shared between processes and starts empty on every start.

use std::collections::HashSet;

use hookrelay_core::UnitKey;
use tokio::sync::RwLock;

/// Set of execution units with an outstanding delivery run.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    keys: RwLock<HashSet<UnitKey>>,
}

impl InFlightGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` in flight. Returns `false` if it already was.
    pub async fn try_acquire(&self, key: &UnitKey) -> bool {
        self.keys.write().await.insert(key.clone())
    }

    /// Clears the marker for `key`.
    pub async fn release(&self, key: &UnitKey) {
        self.keys.write().await.remove(key);
    }

    /// Whether `key` is currently in flight.
    pub async fn contains(&self, key: &UnitKey) -> bool {
        self.keys.read().await.contains(key)
    }

    /// Number of units in flight.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Whether no unit is in flight.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hookrelay_core::{NotificationId, WebhookUrl};

    use super::*;

    fn key() -> UnitKey {
        UnitKey {
            notification_id: NotificationId::new(),
            webhook: WebhookUrl::parse("https://example.com/hook").unwrap(),
        }
    }

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let guard = InFlightGuard::new();
        let key = key();

        assert!(guard.try_acquire(&key).await);
        assert!(!guard.try_acquire(&key).await);
        assert!(guard.contains(&key).await);

        guard.release(&key).await;
        assert!(!guard.contains(&key).await);
        assert!(guard.try_acquire(&key).await);
    }

    #[tokio::test]
    async fn concurrent_acquires_have_one_winner() {
        let guard = Arc::new(InFlightGuard::new());
        let key = key();

        let attempts = (0..16).map(|_| {
            let guard = guard.clone();
            let key = key.clone();
            tokio::spawn(async move { guard.try_acquire(&key).await })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
        assert_eq!(guard.len().await, 1);
    }

    #[tokio::test]
    async fn releasing_unknown_key_is_harmless() {
        let guard = InFlightGuard::new();
        guard.release(&key()).await;
        assert!(guard.is_empty().await);
    }
}
