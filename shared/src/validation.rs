//! Validation helpers for warehouse receipt input

use rust_decimal::Decimal;

/// Minimum length for a search token
pub const MIN_SEARCH_LENGTH: usize = 3;

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.contains('@') && email.contains('.') && email.len() >= 5 {
        Ok(())
    } else {
        Err("Invalid email format")
    }
}

/// Validate that a search token is long enough to be useful
pub fn validate_search_token(token: &str) -> Result<(), &'static str> {
    if token.trim().len() < MIN_SEARCH_LENGTH {
        Err("Search term must be at least 3 characters")
    } else {
        Ok(())
    }
}

/// Validate that a decimal amount is not negative
pub fn validate_non_negative(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO {
        Err("Value cannot be negative")
    } else {
        Ok(())
    }
}

/// Validate that a required text field is present and non-blank
pub fn validate_required(value: Option<&str>) -> Result<(), &'static str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err("Field is required"),
    }
}
