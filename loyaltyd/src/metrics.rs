//! Prometheus metrics for the reconciliation pipeline.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `loyalty_discovery_sweeps_total` | Counter | `result` |
//! | `loyalty_discovery_enqueued_total` | Counter | |
//! | `loyalty_submissions_total` | Counter | `outcome` |
//! | `loyalty_flushes_total` | Counter | `result` |
//! | `loyalty_oracle_responses_total` | Counter | `outcome` |
//! | `loyalty_order_updates_total` | Counter | `result` |

use loyalty_reconcile::{
    DropReason, FlushReport, OracleOutcome, ReconcileObserver, Submission, SweepReport,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors from the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with Prometheus.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Daemon metrics, registered in a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    sweeps: IntCounterVec,
    discovery_enqueued: IntCounter,
    submissions: IntCounterVec,
    flushes: IntCounterVec,
    oracle_responses: IntCounterVec,
    order_updates: IntCounterVec,
}

impl Metrics {
    /// Create and register every metric.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sweeps = IntCounterVec::new(
            Opts::new("loyalty_discovery_sweeps_total", "Discovery sweeps by result"),
            &["result"],
        )?;
        registry.register(Box::new(sweeps.clone()))?;

        let discovery_enqueued = IntCounter::new(
            "loyalty_discovery_enqueued_total",
            "Pending orders pushed into the queue by discovery",
        )?;
        registry.register(Box::new(discovery_enqueued.clone()))?;

        let submissions = IntCounterVec::new(
            Opts::new("loyalty_submissions_total", "Best-effort submissions of uploaded orders"),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions.clone()))?;

        let flushes = IntCounterVec::new(
            Opts::new("loyalty_flushes_total", "Worker batch flushes by result"),
            &["result"],
        )?;
        registry.register(Box::new(flushes.clone()))?;

        let oracle_responses = IntCounterVec::new(
            Opts::new("loyalty_oracle_responses_total", "Accrual system answers by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(oracle_responses.clone()))?;

        let order_updates = IntCounterVec::new(
            Opts::new("loyalty_order_updates_total", "Order updates written by the worker"),
            &["result"],
        )?;
        registry.register(Box::new(order_updates.clone()))?;

        Ok(Self {
            registry,
            sweeps,
            discovery_enqueued,
            submissions,
            flushes,
            oracle_responses,
            order_updates,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

impl ReconcileObserver for Metrics {
    fn sweep_completed(&self, report: &SweepReport) {
        let result = if report.halted { "halted" } else { "completed" };
        self.sweeps.with_label_values(&[result]).inc();
        self.discovery_enqueued.inc_by(report.enqueued as u64);
    }

    fn sweep_failed(&self) {
        self.sweeps.with_label_values(&["failed"]).inc();
    }

    fn submitted(&self, submission: Submission) {
        let outcome = match submission {
            Submission::Enqueued => "enqueued",
            Submission::Dropped(DropReason::QueueFull) => "dropped_full",
            Submission::Dropped(DropReason::QueueClosed) => "dropped_closed",
        };
        self.submissions.with_label_values(&[outcome]).inc();
    }

    fn oracle_outcome(&self, outcome: OracleOutcome) {
        self.oracle_responses.with_label_values(&[outcome.as_str()]).inc();
    }

    fn update_failed(&self) {
        self.order_updates.with_label_values(&["failed"]).inc();
    }

    fn flush_completed(&self, report: &FlushReport) {
        let result = if report.aborted { "aborted" } else { "completed" };
        self.flushes.with_label_values(&[result]).inc();
        self.order_updates.with_label_values(&["applied"]).inc_by(report.updated as u64);
    }
}
