//! Loyalty Daemon Library
//!
//! Runtime for the loyalty points backend: HTTP API, application service
//! and the accrual reconciliation pipeline.
//!
//! # Architecture
//!
//! ```text
//! client → API (JWT) → LoyaltyService → Store
//!                            │            ▲
//!                         submit          │ update_order (credit)
//!                            ▼            │
//!                       Reconciler ──► AccrualPort (HTTP or stub)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use loyaltyd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::from_config(config).await.expect("Failed to start");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod metrics;
pub mod service;

#[cfg(feature = "postgres")]
pub mod db;

pub use config::{AccrualConfig, ApiConfig, Config, Environment};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use metrics::{Metrics, MetricsError};
pub use service::{Claims, LoyaltyService, ServiceError};
