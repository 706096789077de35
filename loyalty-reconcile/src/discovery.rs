//! Discovery loop: periodically re-enqueues every non-terminal order.
//!
//! This is what guarantees eventual progress. Orders dropped by a full queue
//! on upload, orders skipped after a failed query and orders abandoned by an
//! aborted batch are all found again on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use loyalty_store::{Store, StoreError};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::observer::ReconcileObserver;
use crate::queue::{PushOutcome, QueueHandle};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Non-terminal orders read from the store
    pub found: usize,
    /// Orders pushed into the queue
    pub enqueued: usize,
    /// The sweep ended early on shutdown or a closed queue
    pub halted: bool,
}

/// Periodic sweep of pending orders into the queue.
pub struct DiscoveryLoop<S: Store + ?Sized> {
    store: Arc<S>,
    queue: QueueHandle,
    interval: Duration,
    observer: Arc<dyn ReconcileObserver>,
}

impl<S: Store + ?Sized> DiscoveryLoop<S> {
    /// Create a discovery loop.
    pub fn new(
        store: Arc<S>,
        queue: QueueHandle,
        interval: Duration,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Self {
        Self { store, queue, interval, observer }
    }

    /// Run until `shutdown` fires or the queue closes.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Discovery loop started");

        let mut ticker = interval(self.interval);
        ticker.tick().await; // First tick is immediate

        let mut iteration: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Discovery loop shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    iteration += 1;
                    let span = debug_span!("sweep", iteration);
                    match self.sweep(&shutdown).instrument(span).await {
                        Ok(report) => {
                            self.observer.sweep_completed(&report);
                            if report.halted {
                                break;
                            }
                        }
                        Err(e) => {
                            self.observer.sweep_failed();
                            warn!(error = %e, "Failed to read pending orders (will retry)");
                        }
                    }
                }
            }
        }

        info!("Discovery loop stopped");
    }

    /// Read every pending order and push it into the queue.
    ///
    /// Waits for queue space as needed; stops early when `shutdown` fires or
    /// the queue is closed.
    pub async fn sweep(&self, shutdown: &CancellationToken) -> Result<SweepReport, StoreError> {
        let orders = self.store.orders().get_pending_orders().await?;
        let mut report = SweepReport { found: orders.len(), ..SweepReport::default() };

        for order in orders {
            match self.queue.push(order, shutdown).await {
                PushOutcome::Enqueued => report.enqueued += 1,
                PushOutcome::Cancelled => {
                    debug!("Sweep interrupted by shutdown");
                    report.halted = true;
                    break;
                },
                PushOutcome::Closed => {
                    warn!("Reconciliation queue closed, discovery stops");
                    report.halted = true;
                    break;
                },
            }
        }

        if report.found > 0 {
            info!(found = report.found, enqueued = report.enqueued, "Pending orders enqueued");
        }
        Ok(report)
    }
}
