//! Input validation shared by every command
//!
//! Validation runs before any mutation, so a rejected command has no side effects.

use crate::error::{LogisticsError, Result};
use serde_json::Number;

/// Longest accepted item or project name
pub const MAX_NAME_LEN: usize = 100;

/// Largest amount accepted in one command; keeps ledger sums far from i64 overflow
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// Trim a display name and reject blank or oversized ones
pub fn clean_name(kind: &str, raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LogisticsError::InvalidInput(format!("{} name cannot be blank", kind)));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LogisticsError::InvalidInput(format!(
            "{} name longer than {} characters",
            kind, MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Amounts for deposit, withdraw, ratios and targets must be > 0
pub fn positive_amount(what: &str, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(LogisticsError::InvalidAmount(format!(
            "{} must be a positive whole number, got {}",
            what, amount
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LogisticsError::InvalidAmount(format!(
            "{} must be at most {}, got {}",
            what, MAX_AMOUNT, amount
        )));
    }
    Ok(amount)
}

/// Absolute quantities may be zero but never negative
pub fn non_negative_quantity(quantity: i64) -> Result<i64> {
    if quantity < 0 {
        return Err(LogisticsError::InvalidAmount(format!(
            "quantity cannot be negative, got {}",
            quantity
        )));
    }
    if quantity > MAX_AMOUNT {
        return Err(LogisticsError::InvalidAmount(format!(
            "quantity must be at most {}, got {}",
            MAX_AMOUNT, quantity
        )));
    }
    Ok(quantity)
}

/// Convert a JSON number to a whole amount, rejecting fractions
pub fn whole_number(what: &str, number: &Number) -> Result<i64> {
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    if number.is_u64() {
        return Err(LogisticsError::InvalidAmount(format!("{} {} is too large", what, number)));
    }
    Err(LogisticsError::InvalidAmount(format!(
        "{} must be a whole number, got {}",
        what, number
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name_trims() {
        assert_eq!(clean_name("item", "  Polaris Bit \n").unwrap(), "Polaris Bit");
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = clean_name("project", "   ").unwrap_err();
        assert_eq!(err.to_string(), "invalid input: project name cannot be blank");
    }

    #[test]
    fn test_oversized_name_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(clean_name("item", &long).is_err());
        assert!(clean_name("item", &"x".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_positive_amount() {
        assert_eq!(positive_amount("amount", 5).unwrap(), 5);
        assert!(matches!(
            positive_amount("amount", 0),
            Err(LogisticsError::InvalidAmount(_))
        ));
        assert!(positive_amount("amount", -3).is_err());
        assert!(positive_amount("amount", MAX_AMOUNT + 1).is_err());
    }

    #[test]
    fn test_non_negative_quantity_allows_zero() {
        assert_eq!(non_negative_quantity(0).unwrap(), 0);
        assert!(non_negative_quantity(-1).is_err());
    }

    #[test]
    fn test_whole_number_rejects_fractions() {
        let n: Number = serde_json::from_str("2.5").unwrap();
        let err = whole_number("amount", &n).unwrap_err();
        assert_eq!(err.to_string(), "invalid amount: amount must be a whole number, got 2.5");

        let n: Number = serde_json::from_str("40").unwrap();
        assert_eq!(whole_number("amount", &n).unwrap(), 40);
    }
}
