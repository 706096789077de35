//! Storage layer errors

use std::fmt;
use thiserror::Error;

/// Which uniqueness or balance rule a write ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The order number was already uploaded by the same user
    OrderNumberTaken,
    /// The order number belongs to another user
    OrderTakenByOther,
    /// The balance cannot cover a withdrawal
    InsufficientFunds,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConflictKind::OrderNumberTaken => "order number already uploaded",
            ConflictKind::OrderTakenByOther => "order number uploaded by another user",
            ConflictKind::InsufficientFunds => "insufficient funds",
        };
        f.write_str(text)
    }
}

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (order, balance, withdrawal)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// A write violated a uniqueness or balance rule
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Domain error passthrough (rows that fail domain validation)
    #[error("Domain error: {0}")]
    Domain(#[from] loyalty_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// The conflict kind, if this is a conflict
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            StoreError::Conflict(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// SQLSTATE for unique_violation
#[cfg(feature = "postgres")]
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE for check_violation
#[cfg(feature = "postgres")]
const CHECK_VIOLATION: &str = "23514";

/// Check constraint keeping `balances.current` non-negative
#[cfg(feature = "postgres")]
pub(crate) const BALANCE_CHECK_CONSTRAINT: &str = "balances_current_check";

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("unknown", "unknown"),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                let code = code.as_deref();
                match (code, db_err.constraint()) {
                    // Ownership is resolved by the caller, which knows the user
                    (Some(UNIQUE_VIOLATION), _) => {
                        StoreError::Conflict(ConflictKind::OrderNumberTaken)
                    },
                    (Some(CHECK_VIOLATION), Some(BALANCE_CHECK_CONSTRAINT)) => {
                        StoreError::Conflict(ConflictKind::InsufficientFunds)
                    },
                    _ => StoreError::Database(db_err.to_string()),
                }
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(err.to_string())
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_kind_accessor() {
        let err = StoreError::Conflict(ConflictKind::InsufficientFunds);
        assert_eq!(err.conflict_kind(), Some(ConflictKind::InsufficientFunds));
        assert_eq!(err.to_string(), "Conflict: insufficient funds");

        assert!(StoreError::not_found("order", "42").conflict_kind().is_none());
    }
}
