//! In-memory store implementation
//!
//! Default backend when no database is configured, and the backend used by
//! tests. A single RwLock guards orders, balances and withdrawals together so
//! that crediting an accrual or debiting a withdrawal is atomic with the
//! write that causes it.

use crate::error::{ConflictKind, StoreError};
use crate::repository::{
    BalanceRepository, OrderRepository, OrderUpdate, Store, WithdrawalRepository,
};
use async_trait::async_trait;
use loyalty_domain::{
    Balance, Order, OrderId, OrderNumber, OrderStatus, Points, UserId, Withdrawal,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    order_numbers: HashMap<OrderNumber, OrderId>,
    balances: HashMap<UserId, Balance>,
    withdrawals: Vec<Withdrawal>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()) }
    }

    /// Get the number of orders
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Get the number of withdrawals
    pub fn withdrawal_count(&self) -> usize {
        self.state.read().unwrap().withdrawals.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();

        if let Some(existing_id) = state.order_numbers.get(&order.number) {
            let owner = state.orders.get(existing_id).map(|o| o.user_id);
            let kind = if owner == Some(order.user_id) {
                ConflictKind::OrderNumberTaken
            } else {
                ConflictKind::OrderTakenByOther
            };
            return Err(StoreError::Conflict(kind));
        }

        state.order_numbers.insert(order.number.clone(), order.id);
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state.orders.get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().unwrap();
        let mut orders: Vec<Order> =
            state.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| (b.uploaded_at, b.id).cmp(&(a.uploaded_at, a.id)));
        Ok(orders)
    }

    async fn get_pending_orders(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().unwrap();
        let mut orders: Vec<Order> =
            state.orders.values().filter(|o| !o.is_final()).cloned().collect();
        orders.sort_by(|a, b| (a.uploaded_at, a.id).cmp(&(b.uploaded_at, b.id)));
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> Result<OrderUpdate, StoreError> {
        let mut state = self.state.write().unwrap();

        let stored = state
            .orders
            .get(&order.id)
            .ok_or_else(|| StoreError::not_found("order", order.id.to_string()))?;

        if stored.is_final() {
            return Ok(OrderUpdate::AlreadyFinal);
        }
        let user_id = stored.user_id;

        // Credit first: an overflow must leave the order open
        let credited = if order.status == OrderStatus::Processed {
            let mut balance =
                state.balances.get(&user_id).cloned().unwrap_or_else(|| Balance::empty(user_id));
            balance.credit(order.accrual.unwrap_or(Points::ZERO))?;
            Some(balance)
        } else {
            None
        };

        if let Some(stored) = state.orders.get_mut(&order.id) {
            stored.status = order.status;
            stored.accrual = order.accrual;
        }
        if let Some(balance) = credited {
            state.balances.insert(user_id, balance);
        }

        Ok(OrderUpdate::Applied)
    }
}

// =============================================================================
// Balance Repository Implementation
// =============================================================================

#[async_trait]
impl BalanceRepository for MemoryStore {
    async fn get_balance(&self, user_id: UserId) -> Result<Balance, StoreError> {
        let state = self.state.read().unwrap();
        Ok(state.balances.get(&user_id).cloned().unwrap_or_else(|| Balance::empty(user_id)))
    }
}

// =============================================================================
// Withdrawal Repository Implementation
// =============================================================================

#[async_trait]
impl WithdrawalRepository for MemoryStore {
    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) =
            state.withdrawals.iter().find(|w| w.order_number == withdrawal.order_number)
        {
            let kind = if existing.user_id == withdrawal.user_id {
                ConflictKind::OrderNumberTaken
            } else {
                ConflictKind::OrderTakenByOther
            };
            return Err(StoreError::Conflict(kind));
        }

        let user_id = withdrawal.user_id;
        let balance = state.balances.entry(user_id).or_insert_with(|| Balance::empty(user_id));
        if !balance.debit(withdrawal.sum)? {
            return Err(StoreError::Conflict(ConflictKind::InsufficientFunds));
        }

        state.withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let state = self.state.read().unwrap();
        let mut withdrawals: Vec<Withdrawal> =
            state.withdrawals.iter().filter(|w| w.user_id == user_id).cloned().collect();
        withdrawals.sort_by(|a, b| (b.processed_at, b.id).cmp(&(a.processed_at, a.id)));
        Ok(withdrawals)
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }

    fn withdrawals(&self) -> &dyn WithdrawalRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
