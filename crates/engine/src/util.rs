//! Internal helpers for input validation.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation so the engine enforces consistent invariants.

use crate::{Currency, EngineError, ResultEngine};

/// Trim a required name and reject it when empty.
pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_text(value: &str) -> String {
    value.trim().to_string()
}

/// Reject a zero or negative amount.
pub(crate) fn ensure_positive_amount(amount_minor: i64, label: &str) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::InvalidAmount(format!(
            "{label} amount must be > 0"
        )));
    }
    Ok(())
}

/// Ensure a currency matches the currency of the record it is booked against.
pub(crate) fn ensure_same_currency(
    expected: &Currency,
    actual: &Currency,
    label: &str,
) -> ResultEngine<()> {
    if expected != actual {
        return Err(EngineError::CurrencyMismatch(format!(
            "{label} currency is {}, got {}",
            expected.code(),
            actual.code()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(
            normalize_required_name("  Rent ", "category").unwrap(),
            "Rent"
        );
        assert!(normalize_required_name("   ", "category").is_err());
    }

    #[test]
    fn currency_mismatch_names_both_codes() {
        let usd = Currency::new("USD").unwrap();
        let sos = Currency::new("SOS").unwrap();
        assert_eq!(
            ensure_same_currency(&usd, &sos, "account"),
            Err(EngineError::CurrencyMismatch(
                "account currency is USD, got SOS".to_string()
            ))
        );
    }
}
