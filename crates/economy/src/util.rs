//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so every service enforces the same rules.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{EconomyError, ResultEconomy};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEconomy<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EconomyError::Validation(format!("invalid {label} id: {value}")))
}

/// Convert a stored epoch-millisecond value back into a UTC timestamp.
pub(crate) fn from_millis(value: i64, label: &str) -> ResultEconomy<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| EconomyError::Validation(format!("invalid {label} timestamp: {value}")))
}

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

/// Trim a child id and reject empty ones.
pub(crate) fn normalize_child_id(child_id: &str) -> ResultEconomy<String> {
    let trimmed = child_id.trim();
    if trimmed.is_empty() {
        return Err(EconomyError::Validation(
            "child id must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Reject non-positive amounts before any state is touched.
pub(crate) fn require_positive(amount: i64, label: &str) -> ResultEconomy<()> {
    if amount <= 0 {
        return Err(EconomyError::Validation(format!("{label} must be > 0")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn millis_survive_storage() {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap();
        assert_eq!(from_millis(to_millis(at), "test").unwrap(), at);
    }

    #[test]
    fn child_id_is_trimmed() {
        assert_eq!(normalize_child_id("  ada ").unwrap(), "ada");
        assert!(normalize_child_id("   ").is_err());
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(require_positive(0, "amount").is_err());
        assert!(require_positive(-3, "amount").is_err());
        assert!(require_positive(1, "amount").is_ok());
    }
}
