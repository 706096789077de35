//! Loyalty Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the order lifecycle, balances, withdrawals and the
//! order-number check digit rule.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    AccrualVerdict, Balance, Order, OrderId, OrderStatus, UserId, Withdrawal, WithdrawalId,
};
pub use value_objects::{luhn_valid, DomainError, OrderNumber, Points};
