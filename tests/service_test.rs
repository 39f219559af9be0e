//! End-to-end tests: configuration layered through figment drives a running
//! webhook manager against mock webhook endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use figment::providers::Serialized;
use hookrelay::{Config, StoreBackend};
use hookrelay_core::{
    storage::{Collection, MemoryStore},
    DeliveryHooks, ExecutionUnit, NewNotification, RealClock,
};
use hookrelay_delivery::WebhookManager;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default)]
struct CountingHooks {
    delivered: AtomicUsize,
    failed: AtomicUsize,
}

#[async_trait::async_trait]
impl DeliveryHooks for CountingHooks {
    async fn on_success(&self, _unit: &ExecutionUnit) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_error(&self, _unit: &ExecutionUnit) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config(retry_schedule_seconds: &[u64]) -> Config {
    let figment = Config::figment()
        .merge(Serialized::default("poll_interval_seconds", 1))
        .merge(Serialized::default("worker_count", 2))
        .merge(Serialized::default("delivery_timeout_seconds", 5))
        .merge(Serialized::default("shutdown_timeout_seconds", 5))
        .merge(Serialized::default("retry_schedule_seconds", retry_schedule_seconds.to_vec()))
        .merge(Serialized::default("namespace", "e2e"));
    Config::from_figment(figment).unwrap()
}

async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(15), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if result.is_err() {
        panic!("timed out waiting for {what}");
    }
}

#[test]
fn figment_overrides_apply_on_top_of_defaults() {
    let config = test_config(&[1, 2]);

    assert_eq!(config.store_backend, StoreBackend::Memory);
    assert_eq!(config.namespace, "e2e");
    assert_eq!(config.worker_count, 2);

    let manager_config = config.to_manager_config().unwrap();
    assert_eq!(manager_config.retry_schedule.exhaustion_threshold(), 2);
    assert_eq!(manager_config.poll_interval, Duration::from_secs(1));
}

#[tokio::test]
async fn notification_reaches_every_webhook() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for server in [&first, &second] {
        Mock::given(matchers::method("POST"))
            .and(matchers::header("content-type", "application/json; charset=utf-8"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
    }

    let store = Arc::new(MemoryStore::new());
    let hooks = Arc::new(CountingHooks::default());
    let config = test_config(&[1]);
    let mut manager = WebhookManager::new(
        store.clone(),
        config.to_manager_config().unwrap(),
        Arc::new(RealClock::new()),
        hooks.clone(),
    )
    .unwrap();

    manager.register_webhooks(&[first.uri(), second.uri()]).await.unwrap();
    let ids = manager
        .submit_notifications(vec![NewNotification::new("invoice.paid")
            .with_ids(vec!["inv_1".into()])
            .with_extra(serde_json::json!({"amount": 1200}))])
        .await
        .unwrap();
    manager.start().await.unwrap();

    wait_for("both deliveries", || hooks.delivered.load(Ordering::SeqCst) == 2).await;

    let request = &first.received_requests().await.unwrap()[0];
    let payload: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(payload["id"], serde_json::json!(ids[0].to_string()));
    assert_eq!(payload["event"], "invoice.paid");
    assert_eq!(payload["ids"], serde_json::json!(["inv_1"]));
    assert_eq!(payload["extra"]["amount"], 1200);

    manager.shutdown().await.unwrap();
    assert_eq!(store.entry_count(Collection::ExecutionUnits).await, 0);
    assert_eq!(store.entry_count(Collection::Notifications).await, 0);
}

#[tokio::test]
async fn failing_endpoint_is_retried_on_schedule() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let hooks = Arc::new(CountingHooks::default());
    let mut manager = WebhookManager::new(
        store.clone(),
        test_config(&[1, 1, 1]).to_manager_config().unwrap(),
        Arc::new(RealClock::new()),
        hooks.clone(),
    )
    .unwrap();

    manager.register_webhooks(&[server.uri()]).await.unwrap();
    manager.submit_notifications(vec![NewNotification::new("flaky")]).await.unwrap();
    manager.start().await.unwrap();

    wait_for("delivery after one retry", || hooks.delivered.load(Ordering::SeqCst) == 1).await;

    assert_eq!(hooks.failed.load(Ordering::SeqCst), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    let stats = manager.stats().await;
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed_attempts, 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn namespaces_sharing_a_store_stay_isolated() {
    let store = Arc::new(MemoryStore::new());
    let make = |namespace: &str| {
        let figment = Config::figment().merge(Serialized::default("namespace", namespace));
        let config = Config::from_figment(figment).unwrap();
        WebhookManager::new(
            store.clone(),
            config.to_manager_config().unwrap(),
            Arc::new(RealClock::new()),
            Arc::new(CountingHooks::default()),
        )
        .unwrap()
    };
    let tenant_a = make("tenant-a");
    let tenant_b = make("tenant-b");

    tenant_a.register_webhooks(&["https://a.example.com/hook"]).await.unwrap();
    tenant_a.submit_notifications(vec![NewNotification::new("only.a")]).await.unwrap();

    assert_eq!(tenant_a.get_webhooks().await.unwrap().len(), 1);
    assert!(tenant_b.get_webhooks().await.unwrap().is_empty());
    assert!(tenant_b.get_notifications().await.unwrap().is_empty());
    assert_eq!(tenant_b.dispatch_once().await.unwrap(), 0);
}
