//! Stub accrual system for tests and local runs.
//!
//! Answers from a script keyed by order number; unscripted orders are
//! reported as not registered.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::AccrualError;
use crate::ports::{AccrualPort, OracleReport, OracleStatus};

// =============================================================================
// Stub Accrual
// =============================================================================

/// Scripted accrual system.
pub struct StubAccrual {
    /// Scripted answers by order number
    responses: RwLock<HashMap<String, Result<OracleReport, AccrualError>>>,
    /// Order numbers queried, in call order
    calls: RwLock<Vec<String>>,
    /// Artificial latency per call
    latency: RwLock<Option<Duration>>,
}

impl StubAccrual {
    /// Create a stub with no scripted answers.
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            latency: RwLock::new(None),
        }
    }

    /// Script a status report for an order.
    pub fn respond(&self, number: &str, status: OracleStatus, accrual: Option<Decimal>) {
        let report = OracleReport::new(number, status, accrual);
        self.responses.write().unwrap().insert(number.to_string(), Ok(report));
    }

    /// Script a failure for an order.
    pub fn fail(&self, number: &str, error: AccrualError) {
        self.responses.write().unwrap().insert(number.to_string(), Err(error));
    }

    /// Delay every answer.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().unwrap() = Some(latency);
    }

    /// Order numbers queried so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

impl Default for StubAccrual {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccrualPort for StubAccrual {
    async fn get_order_info(&self, number: &str) -> Result<OracleReport, AccrualError> {
        self.calls.write().unwrap().push(number.to_string());

        let latency = *self.latency.read().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let responses = self.responses.read().unwrap();
        responses.get(number).cloned().unwrap_or(Err(AccrualError::NotRegistered))
    }
}
