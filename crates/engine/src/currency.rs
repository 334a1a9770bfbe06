use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// ISO-like currency code (three ASCII letters, upper case).
///
/// The engine never converts between currencies: a transaction is booked in
/// the currency of its account, and an optional converted amount is stored
/// as supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses and normalizes a currency code (`"usd"` → `USD`).
    pub fn new(code: &str) -> ResultEngine<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EngineError::Validation(format!(
                "invalid currency code: {code}"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Canonical currency code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for Currency {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// Decides whether a currency may be used by transactions, bills and budgets.
pub trait CurrencyValidator: Send + Sync {
    fn is_allowed(&self, currency: &Currency) -> bool;
}

/// Allow-list backed validator, usually built from settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowedCurrencies {
    codes: BTreeSet<Currency>,
}

impl AllowedCurrencies {
    pub fn new<I, S>(codes: I) -> ResultEngine<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|code| Currency::new(code.as_ref()))
            .collect::<ResultEngine<BTreeSet<_>>>()?;
        if codes.is_empty() {
            return Err(EngineError::Validation(
                "at least one currency must be allowed".to_string(),
            ));
        }
        Ok(Self { codes })
    }

    pub fn codes(&self) -> impl Iterator<Item = &Currency> {
        self.codes.iter()
    }
}

impl Default for AllowedCurrencies {
    fn default() -> Self {
        Self {
            codes: ["USD", "SOS"]
                .into_iter()
                .map(|code| Currency(code.to_string()))
                .collect(),
        }
    }
}

impl CurrencyValidator for AllowedCurrencies {
    fn is_allowed(&self, currency: &Currency) -> bool {
        self.codes.contains(currency)
    }
}

/// Reject a currency outside the allowed set.
pub(crate) fn ensure_allowed(
    validator: &dyn CurrencyValidator,
    currency: &Currency,
) -> ResultEngine<()> {
    if !validator.is_allowed(currency) {
        return Err(EngineError::CurrencyNotAllowed(currency.code().to_string()));
    }
    Ok(())
}
