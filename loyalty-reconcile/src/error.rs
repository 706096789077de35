//! Reconciliation error types.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by the accrual system client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccrualError {
    /// The accrual system does not know the order yet
    #[error("Order is not registered in the accrual system")]
    NotRegistered,

    /// Too many requests; the accrual system asked us to back off
    #[error("Accrual system rate limit exceeded")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header, if any
        retry_after: Option<Duration>,
    },

    /// The accrual system failed internally
    #[error("Accrual system internal error")]
    Internal,

    /// Transport failure, timeout, unexpected status or undecodable body
    #[error("Accrual request failed: {0}")]
    Other(String),
}

impl AccrualError {
    /// Whether the rest of the current batch must be abandoned.
    ///
    /// Rate limiting and internal errors are system-wide, so querying the
    /// remaining orders would only make things worse.
    pub fn aborts_batch(&self) -> bool {
        matches!(self, AccrualError::RateLimited { .. } | AccrualError::Internal)
    }

    /// Back-off requested by the accrual system, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AccrualError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while setting up the reconciliation pipeline.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A tunable is out of range
    #[error("Invalid reconciliation config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_classification() {
        assert!(AccrualError::RateLimited { retry_after: None }.aborts_batch());
        assert!(AccrualError::Internal.aborts_batch());
        assert!(!AccrualError::NotRegistered.aborts_batch());
        assert!(!AccrualError::Other("timeout".to_string()).aborts_batch());
    }

    #[test]
    fn test_retry_after() {
        let limited = AccrualError::RateLimited { retry_after: Some(Duration::from_secs(60)) };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(60)));
        assert_eq!(AccrualError::Internal.retry_after(), None);
    }
}
