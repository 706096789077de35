//! Accrual System REST Client
//!
//! Queries the external accrual system for the status of an order:
//!
//! ```text
//! GET {base}/api/orders/{number}
//!
//! 200  {"order": "...", "status": "REGISTERED|INVALID|PROCESSING|PROCESSED", "accrual": 500}
//! 204  order not registered
//! 429  rate limited (Retry-After: <seconds>)
//! 500  internal error
//! ```

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use loyalty_reconcile::{AccrualError, AccrualPort, OracleReport, OracleStatus};

// =============================================================================
// Constants
// =============================================================================

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Errors
// =============================================================================

/// Transport-level failures of the accrual client.
///
/// All of them surface to the pipeline as `AccrualError::Other`.
#[derive(Debug, Clone, Error)]
pub enum AccrualHttpError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Status code outside the documented set
    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<AccrualHttpError> for AccrualError {
    fn from(err: AccrualHttpError) -> Self {
        AccrualError::Other(err.to_string())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct AccrualResponse {
    #[serde(alias = "number")]
    order: String,
    status: String,
    #[serde(default)]
    accrual: Option<Decimal>,
}

// =============================================================================
// Accrual HTTP Client
// =============================================================================

/// HTTP client for the accrual system.
pub struct AccrualHttpClient {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Whole-request timeout
    timeout: Duration,
}

impl AccrualHttpClient {
    /// Create a client for the accrual system at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: Client::new(), base_url, timeout }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, number: &str) -> Result<OracleReport, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccrualHttpError::RequestFailed(e.to_string()))?;

        let status = response.status();
        debug!(order_number = number, status = status.as_u16(), "Accrual system responded");

        match status {
            StatusCode::OK => {},
            StatusCode::NO_CONTENT => return Err(AccrualError::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(AccrualError::RateLimited { retry_after });
            },
            StatusCode::INTERNAL_SERVER_ERROR => return Err(AccrualError::Internal),
            other => return Err(AccrualHttpError::UnexpectedStatus(other.as_u16()).into()),
        }

        let body = response.text().await.map_err(|e| AccrualHttpError::ParseError(e.to_string()))?;
        let parsed: AccrualResponse = serde_json::from_str(&body)
            .map_err(|e| AccrualHttpError::ParseError(format!("{}: {}", e, body)))?;

        Ok(OracleReport::new(parsed.order, OracleStatus::from_wire(&parsed.status), parsed.accrual))
    }
}

#[async_trait]
impl AccrualPort for AccrualHttpClient {
    async fn get_order_info(&self, number: &str) -> Result<OracleReport, AccrualError> {
        timeout(self.timeout, self.fetch(number))
            .await
            .map_err(|_| AccrualError::from(AccrualHttpError::Timeout))?
    }
}
