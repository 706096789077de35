//! Daemon error types.

use loyalty_reconcile::ReconcileError;
use loyalty_store::StoreError;
use thiserror::Error;

use crate::metrics::MetricsError;
use crate::service::ServiceError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Reconciliation pipeline error
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Application service error
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// API server failed to bind or serve
    #[error("API server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
