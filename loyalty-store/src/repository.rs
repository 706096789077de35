//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use loyalty_domain::{Balance, Order, OrderId, UserId, Withdrawal};

/// Result of a conditional order update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderUpdate {
    /// Status and accrual were written (and the balance credited on PROCESSED)
    Applied,
    /// The stored order was already INVALID or PROCESSED; nothing was written
    AlreadyFinal,
}

/// Repository for Order entities
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a freshly uploaded order.
    ///
    /// Fails with `Conflict(OrderNumberTaken)` when the same user already
    /// uploaded the number and `Conflict(OrderTakenByOther)` when another
    /// user did.
    async fn create_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Find an order by ID
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Find all orders of a user, newest first
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Every order in NEW or PROCESSING, across all users, oldest first
    async fn get_pending_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Persist status and accrual of an order.
    ///
    /// Conditional on the stored row still being non-terminal. On the
    /// transition into PROCESSED the owner's balance is credited with the
    /// accrual in the same atomic step.
    async fn update_order(&self, order: &Order) -> Result<OrderUpdate, StoreError>;
}

/// Repository for user balances
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Get a user's balance (zero if the user never accrued anything)
    async fn get_balance(&self, user_id: UserId) -> Result<Balance, StoreError>;
}

/// Repository for Withdrawal entities
#[async_trait]
pub trait WithdrawalRepository: Send + Sync {
    /// Record a withdrawal and debit the balance atomically.
    ///
    /// Fails with `Conflict(InsufficientFunds)` when the balance cannot
    /// cover the sum, or an order-number conflict when the number was
    /// already used for a withdrawal.
    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError>;

    /// Find all withdrawals of a user, newest first
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get order repository
    fn orders(&self) -> &dyn OrderRepository;

    /// Get balance repository
    fn balances(&self) -> &dyn BalanceRepository;

    /// Get withdrawal repository
    fn withdrawals(&self) -> &dyn WithdrawalRepository;
}
