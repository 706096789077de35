//! Value Objects for the Loyalty Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Order number contains something other than ASCII digits
    #[error("Invalid order number format: {0}")]
    InvalidOrderNumberFormat(String),

    /// Order number is well-formed but fails the check digit
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    /// Points amount out of range
    #[error("Invalid points amount: {0}")]
    InvalidPoints(String),

    /// Points arithmetic left the representable range
    #[error("Points overflow: {0}")]
    PointsOverflow(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Luhn check digit
// =============================================================================

/// Run the mod-10 (Luhn) check over a digit string.
///
/// Every second digit counting leftwards from the check digit is doubled
/// (9 is subtracted from doubled values above 9). Scanning by index from the
/// start with `coef = len % 2`, digit `i` is doubled when `(i + coef)` is even.
///
/// # Examples
/// ```
/// # use loyalty_domain::value_objects::luhn_valid;
/// assert_eq!(luhn_valid("4561261212345467"), Ok(true));
/// assert_eq!(luhn_valid("4561261212345464"), Ok(false));
/// assert!(luhn_valid("bad_number").is_err());
/// ```
///
/// # Errors
/// Returns `DomainError::InvalidOrderNumberFormat` if the input is empty or
/// contains a non-digit character.
pub fn luhn_valid(number: &str) -> Result<bool, DomainError> {
    if number.is_empty() {
        return Err(DomainError::InvalidOrderNumberFormat("empty order number".to_string()));
    }

    let digits = number
        .chars()
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()
        .ok_or_else(|| DomainError::InvalidOrderNumberFormat(number.to_string()))?;

    let coef = digits.len() % 2;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &digit)| {
            if (i + coef) % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    Ok(sum % 10 == 0)
}

// =============================================================================
// OrderNumber
// =============================================================================

/// OrderNumber is a purchase reference that passed the Luhn check
///
/// # Invariants
/// - Non-empty, ASCII digits only
/// - Luhn check digit is valid
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Parse and validate an order number
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    /// - `DomainError::InvalidOrderNumberFormat` for non-digit input
    /// - `DomainError::InvalidOrderNumber` when the check digit fails
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if luhn_valid(trimmed)? {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DomainError::InvalidOrderNumber(trimmed.to_string()))
        }
    }

    /// Get the number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Points
// =============================================================================

/// Points represents a non-negative amount of loyalty points
///
/// # Invariants
/// - Must be >= 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Points(Decimal);

impl Points {
    /// Zero points
    pub const ZERO: Points = Points(Decimal::ZERO);

    /// Create a new Points amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPoints` if value < 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidPoints(format!("points cannot be negative: {}", value)));
        }
        Ok(Self(value))
    }

    /// Create a strictly positive Points amount (withdrawal sums)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPoints` if value <= 0
    pub fn positive(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPoints(format!("points must be positive: {}", value)));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Add an amount, returning `None` if the sum does not fit in a `Decimal`
    pub fn checked_add(self, other: Points) -> Option<Points> {
        self.0.checked_add(other.0).map(Points)
    }

    /// Subtract an amount, returning `None` if the result would be negative
    pub fn checked_sub(self, other: Points) -> Option<Points> {
        let rest = self.0.checked_sub(other.0)?;
        (rest >= Decimal::ZERO).then_some(Points(rest))
    }
}

impl TryFrom<Decimal> for Points {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Points> for Decimal {
    fn from(value: Points) -> Self {
        value.0
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Luhn tests
    #[test]
    fn test_luhn_even_length() {
        assert_eq!(luhn_valid("4561261212345467"), Ok(true));
        assert_eq!(luhn_valid("4561261212345464"), Ok(false));
    }

    #[test]
    fn test_luhn_odd_length() {
        assert_eq!(luhn_valid("456126121234548"), Ok(true));
        assert_eq!(luhn_valid("456126121234546"), Ok(false));
    }

    #[test]
    fn test_luhn_short_numbers() {
        assert_eq!(luhn_valid("0"), Ok(true));
        assert_eq!(luhn_valid("18"), Ok(true));
        assert_eq!(luhn_valid("79927398713"), Ok(true));
        assert_eq!(luhn_valid("79927398710"), Ok(false));
    }

    #[test]
    fn test_luhn_format_error() {
        assert!(matches!(
            luhn_valid("bad_number"),
            Err(DomainError::InvalidOrderNumberFormat(_))
        ));
        assert!(matches!(luhn_valid(""), Err(DomainError::InvalidOrderNumberFormat(_))));
        assert!(matches!(luhn_valid("12 34"), Err(DomainError::InvalidOrderNumberFormat(_))));
        assert!(matches!(luhn_valid("١٢٣"), Err(DomainError::InvalidOrderNumberFormat(_))));
    }

    // OrderNumber tests
    #[test]
    fn test_order_number_parse() {
        let number = OrderNumber::parse(" 4561261212345467\n").unwrap();
        assert_eq!(number.as_str(), "4561261212345467");

        assert!(matches!(
            OrderNumber::parse("4561261212345464"),
            Err(DomainError::InvalidOrderNumber(_))
        ));
        assert!(matches!(
            OrderNumber::parse("bad_number"),
            Err(DomainError::InvalidOrderNumberFormat(_))
        ));
    }

    #[test]
    fn test_order_number_deserialize_validates() {
        let ok: Result<OrderNumber, _> = serde_json::from_str("\"79927398713\"");
        assert!(ok.is_ok());

        let bad: Result<OrderNumber, _> = serde_json::from_str("\"79927398710\"");
        assert!(bad.is_err());
    }

    // Points tests
    #[test]
    fn test_points_validation() {
        assert!(Points::new(dec!(0)).is_ok());
        assert!(Points::new(dec!(100.5)).is_ok());
        assert!(Points::new(dec!(-0.01)).is_err());

        assert!(Points::positive(dec!(0)).is_err());
        assert!(Points::positive(dec!(0.01)).is_ok());
    }

    #[test]
    fn test_points_json_is_numeric() {
        let points: Points = serde_json::from_str("500").unwrap();
        assert_eq!(points.as_decimal(), dec!(500));

        let fractional: Points = serde_json::from_str("729.98").unwrap();
        assert_eq!(fractional.as_decimal(), dec!(729.98));

        let negative: Result<Points, _> = serde_json::from_str("-1");
        assert!(negative.is_err());
    }

    #[test]
    fn test_points_arithmetic() {
        let a = Points::new(dec!(500)).unwrap();
        let b = Points::new(dec!(729.98)).unwrap();

        assert_eq!(a.checked_add(b).unwrap().as_decimal(), dec!(1229.98));
        assert!(Points::new(Decimal::MAX).unwrap().checked_add(a).is_none());
        assert_eq!(b.checked_sub(a).unwrap().as_decimal(), dec!(229.98));
        assert!(a.checked_sub(b).is_none());
    }
}
