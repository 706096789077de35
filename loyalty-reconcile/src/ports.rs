//! Reconciliation port definitions.
//!
//! `AccrualPort` is the interface to the external accrual system.
//! Adapters implement it for specific transports (HTTP, stub).

use async_trait::async_trait;
use loyalty_domain::{AccrualVerdict, Points};
use rust_decimal::Decimal;
use std::fmt;

use crate::error::AccrualError;

// =============================================================================
// Accrual Port
// =============================================================================

/// Port for querying the accrual system.
///
/// Implementations:
/// - `StubAccrual` - scripted responses for tests and local runs
/// - `AccrualHttpClient` (loyalty-connectors) - the real HTTP service
#[async_trait]
pub trait AccrualPort: Send + Sync {
    /// Ask the accrual system about one order.
    ///
    /// # Errors
    ///
    /// - `NotRegistered` if the order is unknown to the accrual system
    /// - `RateLimited` / `Internal` for system-wide failures
    /// - `Other` for anything else, including timeouts
    async fn get_order_info(&self, number: &str) -> Result<OracleReport, AccrualError>;
}

// =============================================================================
// Types
// =============================================================================

/// Status string reported by the accrual system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleStatus {
    /// Known, not yet processed
    Registered,
    /// Rejected, no payout
    Invalid,
    /// Payout being computed
    Processing,
    /// Payout final
    Processed,
    /// Anything else, kept verbatim for diagnostics
    Unrecognized(String),
}

impl OracleStatus {
    /// Parse the wire representation.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "REGISTERED" => OracleStatus::Registered,
            "INVALID" => OracleStatus::Invalid,
            "PROCESSING" => OracleStatus::Processing,
            "PROCESSED" => OracleStatus::Processed,
            other => OracleStatus::Unrecognized(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            OracleStatus::Registered => "REGISTERED",
            OracleStatus::Invalid => "INVALID",
            OracleStatus::Processing => "PROCESSING",
            OracleStatus::Processed => "PROCESSED",
            OracleStatus::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for OracleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The accrual system's answer for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReport {
    /// Order number echoed back
    pub order: String,
    /// Reported status
    pub status: OracleStatus,
    /// Payout, present with PROCESSED
    pub accrual: Option<Decimal>,
}

impl OracleReport {
    /// Build a report.
    pub fn new(order: impl Into<String>, status: OracleStatus, accrual: Option<Decimal>) -> Self {
        Self { order: order.into(), status, accrual }
    }

    /// Translate the report into a domain verdict.
    ///
    /// Returns `None` for an unrecognised status or a negative accrual.
    /// PROCESSED without an accrual pays zero points.
    pub fn verdict(&self) -> Option<AccrualVerdict> {
        match &self.status {
            OracleStatus::Registered => Some(AccrualVerdict::Registered),
            OracleStatus::Invalid => Some(AccrualVerdict::Invalid),
            OracleStatus::Processing => Some(AccrualVerdict::Processing),
            OracleStatus::Processed => {
                let points = match self.accrual {
                    Some(value) => Points::new(value).ok()?,
                    None => Points::ZERO,
                };
                Some(AccrualVerdict::Processed(points))
            },
            OracleStatus::Unrecognized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_from_wire() {
        assert_eq!(OracleStatus::from_wire("PROCESSED"), OracleStatus::Processed);
        assert_eq!(
            OracleStatus::from_wire("FROZEN"),
            OracleStatus::Unrecognized("FROZEN".to_string())
        );
        assert_eq!(OracleStatus::from_wire("FROZEN").as_str(), "FROZEN");
    }

    #[test]
    fn test_verdicts() {
        let processed = OracleReport::new("79927398713", OracleStatus::Processed, Some(dec!(500)));
        assert_eq!(
            processed.verdict(),
            Some(AccrualVerdict::Processed(Points::new(dec!(500)).unwrap()))
        );

        let no_accrual = OracleReport::new("79927398713", OracleStatus::Processed, None);
        assert_eq!(no_accrual.verdict(), Some(AccrualVerdict::Processed(Points::ZERO)));

        let negative = OracleReport::new("79927398713", OracleStatus::Processed, Some(dec!(-1)));
        assert_eq!(negative.verdict(), None);

        let unknown =
            OracleReport::new("79927398713", OracleStatus::Unrecognized("X".into()), None);
        assert_eq!(unknown.verdict(), None);
    }
}
