//! Loyalty Connectors
//!
//! Adapters for external services.
//! Normalizes service-specific responses to reconciliation types.

#![warn(clippy::all)]

// Public modules
pub mod accrual_http;

// Re-exports
pub use accrual_http::{AccrualHttpClient, AccrualHttpError};
