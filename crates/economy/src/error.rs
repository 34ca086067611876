//! The module contains the errors the economy engine can return.
//!
//! The errors fall into three groups:
//!
//! - input errors ([`Validation`], [`KeyNotFound`]) rejected before any state
//!   is touched;
//! - business outcomes ([`InsufficientBalance`], [`CapReached`],
//!   [`DuplicateTransaction`], [`AlreadyEarned`]) that the caller renders or
//!   treats as already applied;
//! - [`Storage`] failures from the persistence layer, the only retryable
//!   kind.
//!
//!  [`Validation`]: EconomyError::Validation
//!  [`KeyNotFound`]: EconomyError::KeyNotFound
//!  [`InsufficientBalance`]: EconomyError::InsufficientBalance
//!  [`CapReached`]: EconomyError::CapReached
//!  [`DuplicateTransaction`]: EconomyError::DuplicateTransaction
//!  [`AlreadyEarned`]: EconomyError::AlreadyEarned
//!  [`Storage`]: EconomyError::Storage
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Economy engine errors.
#[derive(Error, Debug)]
pub enum EconomyError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("Daily cap reached for child \"{0}\"")]
    CapReached(String),
    #[error("Transaction {0} already recorded")]
    DuplicateTransaction(Uuid),
    #[error("Badge \"{0}\" already earned")]
    AlreadyEarned(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] DbErr),
}

impl EconomyError {
    /// Returns `true` when retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns `true` for expected outcomes that are not failures.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::CapReached(_)
                | Self::DuplicateTransaction(_)
                | Self::AlreadyEarned(_)
        )
    }
}

impl PartialEq for EconomyError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (
                Self::InsufficientBalance {
                    required: ra,
                    available: aa,
                },
                Self::InsufficientBalance {
                    required: rb,
                    available: ab,
                },
            ) => ra == rb && aa == ab,
            (Self::CapReached(a), Self::CapReached(b)) => a == b,
            (Self::DuplicateTransaction(a), Self::DuplicateTransaction(b)) => a == b,
            (Self::AlreadyEarned(a), Self::AlreadyEarned(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Serialization(a), Self::Serialization(b)) => a.to_string() == b.to_string(),
            (Self::Storage(a), Self::Storage(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(EconomyError::Storage(DbErr::Custom("disk".to_string())).is_retryable());
        assert!(!EconomyError::Validation("amount".to_string()).is_retryable());
        assert!(
            !EconomyError::InsufficientBalance {
                required: 10,
                available: 5
            }
            .is_retryable()
        );
    }

    #[test]
    fn business_outcomes_are_flagged() {
        assert!(EconomyError::CapReached("kid".to_string()).is_business_outcome());
        assert!(EconomyError::DuplicateTransaction(Uuid::nil()).is_business_outcome());
        assert!(!EconomyError::KeyNotFound("badge".to_string()).is_business_outcome());
    }
}
