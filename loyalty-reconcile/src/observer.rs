//! Hooks for counting what the pipeline does.
//!
//! The daemon plugs its Prometheus metrics in here; everything else uses
//! [`NoopObserver`].

use crate::discovery::SweepReport;
use crate::error::AccrualError;
use crate::ports::OracleReport;
use crate::queue::Submission;
use crate::worker::FlushReport;

/// Classification of one accrual query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleOutcome {
    /// A status report came back
    Report,
    /// Order unknown to the accrual system
    NotRegistered,
    /// Rate limited
    RateLimited,
    /// Accrual system internal error
    Internal,
    /// Transport or decoding failure
    Other,
}

impl OracleOutcome {
    /// Classify a query result
    pub fn of(result: &Result<OracleReport, AccrualError>) -> Self {
        match result {
            Ok(_) => OracleOutcome::Report,
            Err(AccrualError::NotRegistered) => OracleOutcome::NotRegistered,
            Err(AccrualError::RateLimited { .. }) => OracleOutcome::RateLimited,
            Err(AccrualError::Internal) => OracleOutcome::Internal,
            Err(AccrualError::Other(_)) => OracleOutcome::Other,
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleOutcome::Report => "report",
            OracleOutcome::NotRegistered => "not_registered",
            OracleOutcome::RateLimited => "rate_limited",
            OracleOutcome::Internal => "internal",
            OracleOutcome::Other => "other",
        }
    }
}

/// Receives pipeline events. All methods default to doing nothing.
pub trait ReconcileObserver: Send + Sync {
    /// A discovery sweep finished
    fn sweep_completed(&self, _report: &SweepReport) {}

    /// A discovery sweep could not read pending orders
    fn sweep_failed(&self) {}

    /// A best-effort submission was attempted
    fn submitted(&self, _submission: Submission) {}

    /// The accrual system answered (or failed to)
    fn oracle_outcome(&self, _outcome: OracleOutcome) {}

    /// Persisting an order update failed
    fn update_failed(&self) {}

    /// A worker flush finished
    fn flush_completed(&self, _report: &FlushReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReconcileObserver for NoopObserver {}
