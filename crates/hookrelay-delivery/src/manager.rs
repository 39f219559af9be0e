//! Public API of the delivery engine.
//!
//! `WebhookManager` owns the store-facing repositories and the engine
//! components. Callers register webhooks and submit notifications through it;
//! once started, the dispatcher and worker pool deliver in the background.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{
    storage::{KvStore, Storage},
    Clock, DeliveryHooks, ExecutionUnit, Namespace, NewNotification, Notification, NotificationId,
    WebhookUrl,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{ClientConfig, DeliveryClient},
    dispatcher::Dispatcher,
    error::{DeliveryError, Result},
    inflight::InFlightGuard,
    queue::{work_queue, RetryQueue, WorkReceiver},
    retry::RetrySchedule,
    worker::{DeliveryPolicy, DeliveryWorker, EngineStats},
    worker_pool::WorkerPool,
};

/// Configuration for the webhook manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Pause between the end of one dispatch cycle and the start of the next.
    pub poll_interval: Duration,

    /// Partition of the store this manager reads and writes.
    pub namespace: Namespace,

    /// Backoff delays and exhaustion threshold.
    pub retry_schedule: RetrySchedule,

    /// Remove units that used up the retry schedule instead of keeping them
    /// as failed records.
    pub delete_on_exhaustion: bool,

    /// Number of concurrent delivery workers.
    pub worker_count: usize,

    /// HTTP client configuration.
    pub client: ClientConfig,

    /// Maximum time to wait for workers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(crate::DEFAULT_POLL_INTERVAL_SECONDS),
            namespace: Namespace::default(),
            retry_schedule: RetrySchedule::default(),
            delete_on_exhaustion: false,
            worker_count: crate::DEFAULT_WORKER_COUNT,
            client: ClientConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ManagerConfig {
    /// Checks values that would stall or break the engine.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(DeliveryError::configuration("worker_count must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(DeliveryError::configuration("poll_interval must be greater than zero"));
        }
        if self.client.timeout.is_zero() {
            return Err(DeliveryError::configuration("client timeout must be greater than zero"));
        }
        if self.namespace.as_str().is_empty() {
            return Err(DeliveryError::configuration("namespace must not be empty"));
        }
        Ok(())
    }
}

/// Webhook fan-out manager.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use hookrelay_core::{storage::MemoryStore, NewNotification, NoOpHooks, RealClock};
/// use hookrelay_delivery::{ManagerConfig, WebhookManager};
///
/// # async fn example() -> hookrelay_delivery::Result<()> {
/// let mut manager = WebhookManager::new(
///     Arc::new(MemoryStore::new()),
///     ManagerConfig::default(),
///     Arc::new(RealClock::new()),
///     Arc::new(NoOpHooks::new()),
/// )?;
///
/// manager.register_webhooks(&["https://example.com/hook"]).await?;
/// manager.submit_notifications(vec![NewNotification::new("user.created")]).await?;
/// manager.start().await?;
/// # manager.shutdown().await
/// # }
/// ```
pub struct WebhookManager {
    storage: Storage,
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    guard: Arc<InFlightGuard>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    dispatcher: Dispatcher,
    worker: DeliveryWorker,
    receiver: WorkReceiver,
    worker_pool: Option<WorkerPool>,
    dispatcher_handle: Option<JoinHandle<()>>,
}

impl WebhookManager {
    /// Creates a manager over `store`. Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the configuration is invalid
    /// or the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn KvStore>,
        config: ManagerConfig,
        clock: Arc<dyn Clock>,
        hooks: Arc<dyn DeliveryHooks>,
    ) -> Result<Self> {
        config.validate()?;

        let storage = Storage::new(store, config.namespace.clone());
        let client = Arc::new(DeliveryClient::new(config.client.clone())?);
        let guard = Arc::new(InFlightGuard::new());
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let cancellation_token = CancellationToken::new();
        let (sender, receiver) = work_queue();

        let retries = RetryQueue::new(sender.clone(), clock.clone(), cancellation_token.clone());
        let dispatcher = Dispatcher::new(
            storage.clone(),
            guard.clone(),
            sender,
            clock.clone(),
            config.poll_interval,
        );
        let worker = DeliveryWorker::new(
            storage.clone(),
            client,
            guard.clone(),
            retries,
            DeliveryPolicy {
                retry_schedule: config.retry_schedule.clone(),
                delete_on_exhaustion: config.delete_on_exhaustion,
            },
            hooks,
            stats.clone(),
            clock.clone(),
        );

        Ok(Self {
            storage,
            config,
            clock,
            guard,
            stats,
            cancellation_token,
            dispatcher,
            worker,
            receiver,
            worker_pool: None,
            dispatcher_handle: None,
        })
    }

    /// Starts the worker pool and the dispatch loop.
    ///
    /// Returns immediately; use [`shutdown`](Self::shutdown) to stop.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the manager is already
    /// running or the pool cannot start.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker_pool.is_some() {
            return Err(DeliveryError::configuration("webhook manager already started"));
        }

        info!(
            namespace = %self.config.namespace,
            worker_count = self.config.worker_count,
            poll_interval_ms = self.config.poll_interval.as_millis(),
            exhaustion_threshold = self.config.retry_schedule.exhaustion_threshold(),
            delete_on_exhaustion = self.config.delete_on_exhaustion,
            "starting webhook manager"
        );

        let mut pool = WorkerPool::new(
            self.worker.clone(),
            self.receiver.clone(),
            self.config.worker_count,
            self.stats.clone(),
            self.cancellation_token.clone(),
        );
        pool.spawn_workers().await?;
        self.worker_pool = Some(pool);

        let dispatcher = self.dispatcher.clone();
        let token = self.cancellation_token.clone();
        self.dispatcher_handle = Some(tokio::spawn(async move { dispatcher.run(token).await }));

        Ok(())
    }

    /// Stops the dispatcher, drops pending retries and waits for workers to
    /// finish their current task.
    ///
    /// # Errors
    ///
    /// Returns error if workers do not stop within the shutdown timeout.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down webhook manager");
        self.cancellation_token.cancel();

        if let Some(handle) = self.dispatcher_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatcher task ended abnormally");
            }
        }

        match self.worker_pool.take() {
            Some(pool) => pool.shutdown_graceful(self.config.shutdown_timeout).await,
            None => {
                debug!("webhook manager was not started");
                Ok(())
            },
        }
    }

    /// Runs one dispatch cycle immediately and returns how many units were
    /// enqueued.
    ///
    /// # Errors
    ///
    /// Returns error if listing execution units fails.
    pub async fn dispatch_once(&self) -> Result<usize> {
        self.dispatcher.run_cycle().await
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Number of units with an outstanding delivery run.
    pub async fn in_flight(&self) -> usize {
        self.guard.len().await
    }

    /// Returns the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Stores notifications and fans each one out to every registered
    /// webhook. Returns the generated ids in input order.
    ///
    /// # Errors
    ///
    /// Returns error if a store operation fails. Notifications stored before
    /// the failure are kept.
    pub async fn submit_notifications(
        &self,
        notifications: Vec<NewNotification>,
    ) -> Result<Vec<NotificationId>> {
        let webhooks = self.storage.webhooks.list().await?;
        let mut ids = Vec::with_capacity(notifications.len());

        for input in notifications {
            let notification = input.into_notification(NotificationId::new(), self.clock.now_utc());
            self.storage.notifications.put(&notification).await?;

            for webhook in &webhooks {
                let unit = ExecutionUnit::new(notification.id, webhook.clone());
                self.storage.execution_units.put(&unit).await?;
            }

            debug!(
                notification_id = %notification.id,
                event = %notification.event,
                units = webhooks.len(),
                "notification submitted"
            );
            ids.push(notification.id);
        }

        Ok(ids)
    }

    /// Registers webhooks. Every URL is validated before any is stored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWebhookUrl` for the first URL that is not an absolute
    /// URL, in which case nothing is stored.
    pub async fn register_webhooks<S: AsRef<str>>(&self, urls: &[S]) -> Result<Vec<WebhookUrl>> {
        let webhooks = urls
            .iter()
            .map(|raw| parse_webhook(raw.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        for webhook in &webhooks {
            self.storage.webhooks.put(webhook).await?;
        }

        info!(count = webhooks.len(), "webhooks registered");
        Ok(webhooks)
    }

    /// Finds a notification by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store read fails.
    pub async fn get_notification(&self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(self.storage.notifications.get(id).await?)
    }

    /// Lists every stored notification.
    ///
    /// # Errors
    ///
    /// Returns error if the store scan fails.
    pub async fn get_notifications(&self) -> Result<Vec<Notification>> {
        Ok(self.storage.notifications.list().await?)
    }

    /// Finds a registered webhook.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWebhookUrl` if `url` is not an absolute URL, or error
    /// if the store read fails.
    pub async fn get_webhook(&self, url: &str) -> Result<Option<WebhookUrl>> {
        let webhook = parse_webhook(url)?;
        Ok(self.storage.webhooks.get(&webhook).await?)
    }

    /// Lists every registered webhook.
    ///
    /// # Errors
    ///
    /// Returns error if the store scan fails.
    pub async fn get_webhooks(&self) -> Result<Vec<WebhookUrl>> {
        Ok(self.storage.webhooks.list().await?)
    }

    /// Lists execution units that have failed at least once.
    ///
    /// # Errors
    ///
    /// Returns error if the store scan fails.
    pub async fn get_failed_units(&self) -> Result<Vec<ExecutionUnit>> {
        Ok(self.storage.execution_units.list_failed().await?)
    }

    /// Deletes a notification. Its units are reaped as orphans on dispatch.
    ///
    /// # Errors
    ///
    /// Returns error if the store delete fails.
    pub async fn delete_notification(&self, id: NotificationId) -> Result<()> {
        Ok(self.storage.notifications.delete(id).await?)
    }

    /// Deletes several notifications.
    ///
    /// # Errors
    ///
    /// Returns error if a store delete fails.
    pub async fn delete_notifications(&self, ids: &[NotificationId]) -> Result<()> {
        for id in ids {
            self.delete_notification(*id).await?;
        }
        Ok(())
    }

    /// Deletes every notification in the namespace.
    ///
    /// # Errors
    ///
    /// Returns error if the store scan or a delete fails.
    pub async fn delete_all_notifications(&self) -> Result<()> {
        let ids: Vec<_> = self.get_notifications().await?.into_iter().map(|n| n.id).collect();
        self.delete_notifications(&ids).await
    }

    /// Removes a webhook registration. Its units are reaped as orphans on
    /// dispatch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWebhookUrl` if `url` is not an absolute URL, or error
    /// if the store delete fails.
    pub async fn delete_webhook(&self, url: &str) -> Result<()> {
        let webhook = parse_webhook(url)?;
        Ok(self.storage.webhooks.delete(&webhook).await?)
    }

    /// Removes several webhook registrations.
    ///
    /// # Errors
    ///
    /// Returns error if a URL is invalid or a store delete fails.
    pub async fn delete_webhooks<S: AsRef<str>>(&self, urls: &[S]) -> Result<()> {
        for url in urls {
            self.delete_webhook(url.as_ref()).await?;
        }
        Ok(())
    }

    /// Removes every webhook registration in the namespace.
    ///
    /// # Errors
    ///
    /// Returns error if the store scan or a delete fails.
    pub async fn delete_all_webhooks(&self) -> Result<()> {
        for webhook in self.get_webhooks().await? {
            self.storage.webhooks.delete(&webhook).await?;
        }
        Ok(())
    }
}

fn parse_webhook(raw: &str) -> Result<WebhookUrl> {
    WebhookUrl::parse(raw).map_err(|_| DeliveryError::invalid_webhook_url(raw))
}
