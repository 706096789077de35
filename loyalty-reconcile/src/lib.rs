//! Loyalty Reconciliation
//!
//! Background pipeline that polls the external accrual system for orders
//! awaiting payout and applies the resulting status and balance changes.
//!
//! # Architecture
//!
//! ```text
//! order upload ──submit──┐
//!                        ▼
//! DiscoveryLoop ──push──► queue ──► ReconcileWorker ──► AccrualPort
//!      ▲                                   │
//!      └──── get_pending_orders ── Store ◄─┘ update_order
//! ```
//!
//! - **Ports**: `AccrualPort` is the contract for the accrual system
//! - **Queue**: bounded buffer with a non-blocking and a blocking producer
//! - **DiscoveryLoop**: periodically re-enqueues non-terminal orders
//! - **ReconcileWorker**: drains the queue in timed batches
//! - **Reconciler**: owns both tasks and their shutdown

#![warn(clippy::all)]

pub mod discovery;
pub mod error;
pub mod observer;
pub mod ports;
pub mod queue;
pub mod reconciler;
pub mod stub;
pub mod worker;

pub use discovery::{DiscoveryLoop, SweepReport};
pub use error::{AccrualError, ReconcileError};
pub use observer::{NoopObserver, OracleOutcome, ReconcileObserver};
pub use ports::{AccrualPort, OracleReport, OracleStatus};
pub use queue::{DropReason, PushOutcome, QueueHandle, QueueReceiver, Submission};
pub use reconciler::{ReconcileConfig, Reconciler};
pub use stub::StubAccrual;
pub use worker::{flush_batch, FlushReport, ReconcileWorker};
