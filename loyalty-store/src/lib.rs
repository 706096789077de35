//! Loyalty Storage Layer
//!
//! Provides persistence for orders, balances and withdrawals.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Default backend, also used by tests
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use loyalty_store::{MemoryStore, Store};
//! use loyalty_domain::{Order, OrderNumber};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let order = Order::new(Uuid::now_v7(), OrderNumber::parse("79927398713").unwrap());
//!     store.orders().create_order(&order).await.unwrap();
//!
//!     let pending = store.orders().get_pending_orders().await.unwrap();
//!     println!("Pending orders: {}", pending.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::{ConflictKind, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{
    BalanceRepository, OrderRepository, OrderUpdate, Store, WithdrawalRepository,
};
