//! Domain Entities for the Loyalty Backend
//!
//! Orders move through the accrual lifecycle; balances and withdrawals
//! record what users earned and spent.

use crate::value_objects::{DomainError, OrderNumber, Points};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a User (issued by the external auth service)
pub type UserId = Uuid;

/// Unique identifier for an Order
pub type OrderId = Uuid;

/// Unique identifier for a Withdrawal
pub type WithdrawalId = Uuid;

// =============================================================================
// Order Status
// =============================================================================

/// Order status lifecycle
///
/// ```text
/// NEW ──► PROCESSING ──► PROCESSED
///  │          │
///  │          └────────► INVALID
///  ├────────────────────► PROCESSED
///  └────────────────────► INVALID
/// ```
///
/// INVALID and PROCESSED are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Uploaded, not yet seen by the accrual oracle
    New,
    /// Oracle is computing the accrual
    Processing,
    /// Oracle rejected the order (terminal)
    Invalid,
    /// Oracle paid out (terminal)
    Processed,
}

impl OrderStatus {
    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    /// Terminal statuses never change again
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Whether the lifecycle allows moving from `self` to `to`
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        match self {
            OrderStatus::New => true,
            OrderStatus::Processing => to != OrderStatus::New,
            OrderStatus::Invalid | OrderStatus::Processed => *self == to,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(DomainError::InvalidStateTransition(format!(
                "unknown order status: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Accrual Verdict
// =============================================================================

/// What the accrual oracle decided about an order, in domain terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualVerdict {
    /// Oracle knows the order but has not started on it
    Registered,
    /// Oracle rejected the order
    Invalid,
    /// Oracle is still computing
    Processing,
    /// Oracle paid out the given amount
    Processed(Points),
}

// =============================================================================
// Order
// =============================================================================

/// Order is a purchase reference uploaded by a user for points accrual
///
/// Status and accrual are only mutated through [`Order::apply_verdict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Present only once the order is PROCESSED
    pub accrual: Option<Points>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// Create a freshly uploaded order in NEW status
    pub fn new(user_id: UserId, number: OrderNumber) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            number,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }

    /// Check if the order reached a terminal status
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// Apply an oracle verdict to this order.
    ///
    /// Returns `Ok(true)` when status or accrual changed and the order must be
    /// persisted, `Ok(false)` when the verdict leaves it as it is.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` when the verdict would
    /// move a terminal order to a different status.
    pub fn apply_verdict(&mut self, verdict: AccrualVerdict) -> Result<bool, DomainError> {
        let (target, accrual) = match verdict {
            AccrualVerdict::Registered => return Ok(false),
            AccrualVerdict::Invalid => (OrderStatus::Invalid, None),
            AccrualVerdict::Processing => (OrderStatus::Processing, None),
            AccrualVerdict::Processed(points) => (OrderStatus::Processed, Some(points)),
        };

        if target == self.status {
            return Ok(false);
        }

        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidStateTransition(format!(
                "order {} cannot move from {} to {}",
                self.number, self.status, target
            )));
        }

        self.status = target;
        self.accrual = accrual;
        Ok(true)
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Balance tracks a user's spendable and already-withdrawn points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub current: Points,
    pub withdrawn: Points,
}

impl Balance {
    /// A balance for a user with no accruals yet
    pub fn empty(user_id: UserId) -> Self {
        Self { user_id, current: Points::ZERO, withdrawn: Points::ZERO }
    }

    /// Credit an accrual.
    ///
    /// Leaves the balance untouched if the new total would overflow.
    pub fn credit(&mut self, amount: Points) -> Result<(), DomainError> {
        self.current = self.current.checked_add(amount).ok_or_else(|| {
            DomainError::PointsOverflow(format!("crediting {} to {}", amount, self.current))
        })?;
        Ok(())
    }

    /// Debit a withdrawal, returning `Ok(false)` if funds are insufficient
    pub fn debit(&mut self, amount: Points) -> Result<bool, DomainError> {
        let Some(rest) = self.current.checked_sub(amount) else {
            return Ok(false);
        };
        let withdrawn = self.withdrawn.checked_add(amount).ok_or_else(|| {
            DomainError::PointsOverflow(format!("withdrawing {} after {}", amount, self.withdrawn))
        })?;
        self.current = rest;
        self.withdrawn = withdrawn;
        Ok(true)
    }
}

// =============================================================================
// Withdrawal
// =============================================================================

/// Withdrawal spends points against a new order number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub sum: Points,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Create a withdrawal stamped now
    pub fn new(user_id: UserId, order_number: OrderNumber, sum: Points) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            order_number,
            sum,
            processed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order() -> Order {
        Order::new(Uuid::now_v7(), OrderNumber::parse("79927398713").unwrap())
    }

    #[test]
    fn test_order_creation() {
        let order = new_order();

        assert_eq!(order.status, OrderStatus::New);
        assert!(order.accrual.is_none());
        assert!(!order.is_final());
    }

    #[test]
    fn test_registered_leaves_order_untouched() {
        let mut order = new_order();

        assert_eq!(order.apply_verdict(AccrualVerdict::Registered), Ok(false));
        assert_eq!(order.status, OrderStatus::New);
    }

    #[test]
    fn test_processing_then_processed() {
        let mut order = new_order();

        assert_eq!(order.apply_verdict(AccrualVerdict::Processing), Ok(true));
        assert_eq!(order.status, OrderStatus::Processing);

        // Same verdict again is not a change
        assert_eq!(order.apply_verdict(AccrualVerdict::Processing), Ok(false));

        let points = Points::new(dec!(500)).unwrap();
        assert_eq!(order.apply_verdict(AccrualVerdict::Processed(points)), Ok(true));
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, Some(points));
        assert!(order.is_final());
    }

    #[test]
    fn test_invalid_has_no_accrual() {
        let mut order = new_order();

        assert_eq!(order.apply_verdict(AccrualVerdict::Invalid), Ok(true));
        assert_eq!(order.status, OrderStatus::Invalid);
        assert!(order.accrual.is_none());
    }

    #[test]
    fn test_terminal_status_is_absorbing() {
        let mut order = new_order();
        order.apply_verdict(AccrualVerdict::Invalid).unwrap();

        assert!(matches!(
            order.apply_verdict(AccrualVerdict::Processing),
            Err(DomainError::InvalidStateTransition(_))
        ));
        assert!(order.apply_verdict(AccrualVerdict::Processed(Points::ZERO)).is_err());
        assert_eq!(order.apply_verdict(AccrualVerdict::Invalid), Ok(false));
        assert_eq!(order.status, OrderStatus::Invalid);
    }

    #[test]
    fn test_processed_twice_does_not_change_accrual() {
        let mut order = new_order();
        let first = Points::new(dec!(500)).unwrap();
        order.apply_verdict(AccrualVerdict::Processed(first)).unwrap();

        let second = Points::new(dec!(900)).unwrap();
        assert_eq!(order.apply_verdict(AccrualVerdict::Processed(second)), Ok(false));
        assert_eq!(order.accrual, Some(first));
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(New.can_transition_to(New));
        assert!(New.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Invalid));
        assert!(!Processing.can_transition_to(New));
        assert!(!Processed.can_transition_to(Processing));
        assert!(!Invalid.can_transition_to(Processed));
    }

    #[test]
    fn test_status_string_forms() {
        assert_eq!("PROCESSING".parse::<OrderStatus>(), Ok(OrderStatus::Processing));
        assert!("REGISTERED".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&OrderStatus::Processed).unwrap(), "\"PROCESSED\"");
    }

    #[test]
    fn test_balance_credit_and_debit() {
        let mut balance = Balance::empty(Uuid::now_v7());
        balance.credit(Points::new(dec!(729.98)).unwrap()).unwrap();

        assert!(!balance.debit(Points::new(dec!(800)).unwrap()).unwrap());
        assert_eq!(balance.current.as_decimal(), dec!(729.98));

        assert!(balance.debit(Points::new(dec!(500)).unwrap()).unwrap());
        assert_eq!(balance.current.as_decimal(), dec!(229.98));
        assert_eq!(balance.withdrawn.as_decimal(), dec!(500));
    }

    #[test]
    fn test_balance_credit_overflow_leaves_balance() {
        let mut balance = Balance::empty(Uuid::now_v7());
        let max = Points::new(rust_decimal::Decimal::MAX).unwrap();
        balance.credit(max).unwrap();

        let err = balance.credit(Points::new(dec!(1)).unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::PointsOverflow(_)));
        assert_eq!(balance.current, max);
    }
}
