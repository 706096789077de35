//! Reconciliation worker: drains the queue and flushes batches on a timer.

use std::sync::Arc;
use std::time::Duration;

use loyalty_domain::Order;
use loyalty_store::{OrderUpdate, Store};
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, warn, Instrument};

use crate::error::AccrualError;
use crate::observer::{OracleOutcome, ReconcileObserver};
use crate::ports::AccrualPort;
use crate::queue::QueueReceiver;

/// What one flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Orders the accrual system was asked about
    pub checked: usize,
    /// Orders whose new status was persisted
    pub updated: usize,
    /// Orders whose status did not change
    pub unchanged: usize,
    /// Orders left for a later sweep (query failed, anomaly, store error)
    pub skipped: usize,
    /// The rest of the batch was abandoned
    pub aborted: bool,
    /// Back-off the accrual system asked for when it rate limited us
    pub retry_after: Option<Duration>,
}

/// Single consumer of the reconciliation queue.
pub struct ReconcileWorker<S: Store + ?Sized, A: AccrualPort + ?Sized> {
    store: Arc<S>,
    accrual: Arc<A>,
    queue: QueueReceiver,
    flush_interval: Duration,
    observer: Arc<dyn ReconcileObserver>,
    batch: Vec<Order>,
    paused_until: Option<Instant>,
}

impl<S: Store + ?Sized, A: AccrualPort + ?Sized> ReconcileWorker<S, A> {
    /// Create a worker.
    pub fn new(
        store: Arc<S>,
        accrual: Arc<A>,
        queue: QueueReceiver,
        flush_interval: Duration,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Self {
        Self { store, accrual, queue, flush_interval, observer, batch: Vec::new(), paused_until: None }
    }

    /// Run until `shutdown` fires or every producer is gone.
    ///
    /// The queue is closed on exit so late submissions are reported as dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(flush_interval_ms = self.flush_interval.as_millis() as u64, "Reconcile worker started");

        let mut ticker = interval(self.flush_interval);
        ticker.tick().await; // First tick is immediate

        let mut iteration: u64 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconcile worker shutdown requested");
                    break;
                }
                received = self.queue.recv() => match received {
                    Some(order) => self.batch.push(order),
                    None => {
                        info!("Reconciliation queue closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.batch.is_empty() || self.backing_off() {
                        continue;
                    }
                    iteration += 1;
                    let span = debug_span!("flush", iteration);
                    let report = self.flush(&shutdown).instrument(span).await;
                    self.observer.flush_completed(&report);

                    if let Some(delay) = report.retry_after {
                        info!(retry_after_ms = delay.as_millis() as u64, "Pausing flushes at accrual system request");
                        self.paused_until = Some(Instant::now() + delay);
                    }
                }
            }
        }

        self.queue.close();
        if !self.batch.is_empty() {
            debug!(pending = self.batch.len(), "Dropping unflushed batch; discovery will retry");
        }
        info!("Reconcile worker stopped");
    }

    fn backing_off(&mut self) -> bool {
        match self.paused_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                self.paused_until = None;
                false
            },
            None => false,
        }
    }

    /// Flush the accumulated batch. The batch is empty afterwards.
    pub async fn flush(&mut self, shutdown: &CancellationToken) -> FlushReport {
        let batch = std::mem::take(&mut self.batch);
        flush_batch(
            &batch,
            self.accrual.as_ref(),
            self.store.as_ref(),
            self.observer.as_ref(),
            shutdown,
        )
        .await
    }
}

/// Query the accrual system for each order in `batch`, in order, and persist
/// status changes.
///
/// Rate limiting or an internal accrual error abandons the rest of the batch.
/// An order that is not registered, fails to query, carries an unrecognised
/// status or fails to persist is skipped; discovery will find it again.
pub async fn flush_batch<A, S>(
    batch: &[Order],
    accrual: &A,
    store: &S,
    observer: &dyn ReconcileObserver,
    shutdown: &CancellationToken,
) -> FlushReport
where
    A: AccrualPort + ?Sized,
    S: Store + ?Sized,
{
    let mut report = FlushReport::default();

    for order in batch {
        if shutdown.is_cancelled() {
            debug!("Flush interrupted by shutdown");
            report.aborted = true;
            break;
        }

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(order_number = %order.number, "Accrual query interrupted by shutdown");
                report.aborted = true;
                break;
            }
            result = accrual.get_order_info(order.number.as_str()) => result,
        };
        report.checked += 1;
        observer.oracle_outcome(OracleOutcome::of(&result));

        let oracle = match result {
            Ok(oracle) => oracle,
            Err(e) if e.aborts_batch() => {
                warn!(
                    order_number = %order.number,
                    error = %e,
                    retry_after = ?e.retry_after(),
                    "Accrual system unavailable, aborting batch"
                );
                report.aborted = true;
                report.retry_after = e.retry_after();
                break;
            },
            Err(AccrualError::NotRegistered) => {
                debug!(order_number = %order.number, "Order not registered yet");
                report.skipped += 1;
                continue;
            },
            Err(e) => {
                warn!(order_number = %order.number, error = %e, "Accrual query failed");
                report.skipped += 1;
                continue;
            },
        };

        let Some(verdict) = oracle.verdict() else {
            error!(
                order_number = %order.number,
                status = %oracle.status,
                accrual = ?oracle.accrual,
                "Unrecognised accrual report"
            );
            report.skipped += 1;
            continue;
        };

        let mut next = order.clone();
        match next.apply_verdict(verdict) {
            Ok(true) => {},
            Ok(false) => {
                report.unchanged += 1;
                continue;
            },
            Err(e) => {
                error!(order_number = %order.number, error = %e, "Rejected order transition");
                report.skipped += 1;
                continue;
            },
        }

        match store.orders().update_order(&next).await {
            Ok(OrderUpdate::Applied) => {
                debug!(
                    order_number = %next.number,
                    status = %next.status,
                    accrual = ?next.accrual.map(|p| p.as_decimal()),
                    "Order updated"
                );
                report.updated += 1;
            },
            Ok(OrderUpdate::AlreadyFinal) => {
                debug!(order_number = %next.number, "Order already final");
                report.unchanged += 1;
            },
            Err(e) => {
                warn!(order_number = %next.number, error = %e, "Failed to persist order (will retry)");
                observer.update_failed();
                report.skipped += 1;
            },
        }
    }

    debug!(
        checked = report.checked,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        aborted = report.aborted,
        "Batch flushed"
    );
    report
}
