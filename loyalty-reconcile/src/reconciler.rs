//! Lifecycle controller for the reconciliation pipeline.
//!
//! Owns the queue producer, the discovery and worker tasks, and the
//! cancellation token they share.

use std::sync::Arc;
use std::time::Duration;

use loyalty_domain::Order;
use loyalty_store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::discovery::DiscoveryLoop;
use crate::error::ReconcileError;
use crate::observer::{NoopObserver, ReconcileObserver};
use crate::ports::AccrualPort;
use crate::queue::{self, DropReason, QueueHandle, Submission};
use crate::worker::ReconcileWorker;

/// Reconciliation tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Queue capacity (must be > 0)
    pub queue_capacity: usize,
    /// How often the worker flushes its batch
    pub flush_interval: Duration,
    /// How often discovery sweeps pending orders
    pub discovery_interval: Duration,
}

impl ReconcileConfig {
    /// Check every tunable is in range.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.queue_capacity == 0 {
            return Err(ReconcileError::InvalidConfig(
                "queue capacity must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ReconcileError::InvalidConfig(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        if self.discovery_interval.is_zero() {
            return Err(ReconcileError::InvalidConfig(
                "discovery interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            flush_interval: Duration::from_secs(1),
            discovery_interval: Duration::from_secs(10),
        }
    }
}

/// Running reconciliation pipeline.
pub struct Reconciler {
    queue: QueueHandle,
    shutdown: CancellationToken,
    discovery: JoinHandle<()>,
    worker: JoinHandle<()>,
    observer: Arc<dyn ReconcileObserver>,
}

impl Reconciler {
    /// Validate `config` and start discovery and the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, A>(
        config: ReconcileConfig,
        store: Arc<S>,
        accrual: Arc<A>,
    ) -> Result<Self, ReconcileError>
    where
        S: Store + ?Sized + 'static,
        A: AccrualPort + ?Sized + 'static,
    {
        Self::spawn_with_observer(config, store, accrual, Arc::new(NoopObserver))
    }

    /// Like [`Reconciler::spawn`], reporting pipeline events to `observer`.
    pub fn spawn_with_observer<S, A>(
        config: ReconcileConfig,
        store: Arc<S>,
        accrual: Arc<A>,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Result<Self, ReconcileError>
    where
        S: Store + ?Sized + 'static,
        A: AccrualPort + ?Sized + 'static,
    {
        config.validate()?;

        let (handle, receiver) = queue::bounded(config.queue_capacity)?;
        let shutdown = CancellationToken::new();

        let discovery = DiscoveryLoop::new(
            store.clone(),
            handle.clone(),
            config.discovery_interval,
            observer.clone(),
        );
        let worker = ReconcileWorker::new(
            store,
            accrual,
            receiver,
            config.flush_interval,
            observer.clone(),
        );

        let discovery =
            tokio::spawn(discovery.run(shutdown.clone()).instrument(info_span!("discovery")));
        let worker =
            tokio::spawn(worker.run(shutdown.clone()).instrument(info_span!("reconcile_worker")));

        info!(
            queue_capacity = config.queue_capacity,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            discovery_interval_ms = config.discovery_interval.as_millis() as u64,
            "Reconciler started"
        );

        Ok(Self { queue: handle, shutdown, discovery, worker, observer })
    }

    /// Hand a freshly uploaded order to the worker without waiting.
    ///
    /// A dropped order is not an error: discovery will pick it up.
    pub fn submit(&self, order: Order) -> Submission {
        let number = order.number.clone();
        let submission = self.queue.try_submit(order);
        match submission {
            Submission::Enqueued => debug!(order_number = %number, "Order submitted"),
            Submission::Dropped(DropReason::QueueFull) => {
                warn!(order_number = %number, "Reconciliation queue full, order left for discovery")
            },
            Submission::Dropped(DropReason::QueueClosed) => {
                warn!(order_number = %number, "Reconciler stopped, order left for discovery")
            },
        }
        self.observer.submitted(submission);
        submission
    }

    /// Stop both tasks and wait for them to exit.
    pub async fn shutdown(self) {
        info!("Reconciler shutdown requested");
        self.shutdown.cancel();

        if let Err(e) = self.discovery.await {
            error!(error = %e, "Discovery task failed");
        }
        if let Err(e) = self.worker.await {
            error!(error = %e, "Reconcile worker task failed");
        }

        info!("Reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::OracleStatus;
    use crate::stub::StubAccrual;
    use loyalty_domain::{OrderNumber, OrderStatus};
    use loyalty_store::{MemoryStore, OrderRepository};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn fast_config() -> ReconcileConfig {
        ReconcileConfig {
            queue_capacity: 8,
            flush_interval: Duration::from_millis(20),
            discovery_interval: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ReconcileConfig::default().validate().is_ok());

        let zero_capacity = ReconcileConfig { queue_capacity: 0, ..ReconcileConfig::default() };
        assert!(matches!(zero_capacity.validate(), Err(ReconcileError::InvalidConfig(_))));

        let zero_flush =
            ReconcileConfig { flush_interval: Duration::ZERO, ..ReconcileConfig::default() };
        assert!(zero_flush.validate().is_err());

        let zero_discovery =
            ReconcileConfig { discovery_interval: Duration::ZERO, ..ReconcileConfig::default() };
        assert!(zero_discovery.validate().is_err());
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_config() {
        let config = ReconcileConfig { queue_capacity: 0, ..fast_config() };
        let result = Reconciler::spawn(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(StubAccrual::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_submitted_order_is_processed() {
        let store = Arc::new(MemoryStore::new());
        let accrual = Arc::new(StubAccrual::new());
        let order = Order::new(Uuid::now_v7(), OrderNumber::parse("79927398713").unwrap());
        store.create_order(&order).await.unwrap();
        accrual.respond(order.number.as_str(), OracleStatus::Processed, Some(dec!(10)));

        let reconciler = Reconciler::spawn(fast_config(), store.clone(), accrual).unwrap();
        assert_eq!(reconciler.submit(order.clone()), Submission::Enqueued);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let saved = store.find_by_id(order.id).await.unwrap().unwrap();
            if saved.status == OrderStatus::Processed {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "order never processed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        reconciler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded_while_discovery_blocks() {
        let store = Arc::new(MemoryStore::new());
        for raw in ["4561261212345467", "456126121234548", "79927398713", "18"] {
            let order = Order::new(Uuid::now_v7(), OrderNumber::parse(raw).unwrap());
            store.create_order(&order).await.unwrap();
        }

        // Slow accrual keeps the worker busy so discovery fills the queue and blocks
        let accrual = Arc::new(StubAccrual::new());
        accrual.set_latency(Duration::from_millis(30));

        let config = ReconcileConfig {
            queue_capacity: 1,
            flush_interval: Duration::from_millis(20),
            discovery_interval: Duration::from_millis(10),
        };
        let reconciler = Reconciler::spawn(config, store, accrual).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(1), reconciler.shutdown())
            .await
            .expect("shutdown should complete promptly");
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let reconciler =
            Reconciler::spawn(fast_config(), store, Arc::new(StubAccrual::new())).unwrap();

        let queue = reconciler.queue.clone();
        reconciler.shutdown().await;

        let order = Order::new(Uuid::now_v7(), OrderNumber::parse("79927398713").unwrap());
        assert_eq!(queue.try_submit(order), Submission::Dropped(DropReason::QueueClosed));
    }
}
