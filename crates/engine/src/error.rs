//! The module contains the error the engine can throw.
//!
//! The errors fall in four families:
//!
//! - validation ([`Validation`], [`InvalidSplit`], [`InvalidAmount`],
//!   [`CurrencyNotAllowed`], [`CurrencyMismatch`], [`InvalidTransition`]):
//!   the input is rejected before anything is written.
//! - [`InsufficientFunds`]: a withdrawal would drive an account negative.
//! - [`ConcurrencyConflict`]: another writer won the race, the caller retries.
//! - [`KeyNotFound`] / [`ExistingKey`]: missing or duplicated records.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`InvalidSplit`]: EngineError::InvalidSplit
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`CurrencyNotAllowed`]: EngineError::CurrencyNotAllowed
//!  [`CurrencyMismatch`]: EngineError::CurrencyMismatch
//!  [`InvalidTransition`]: EngineError::InvalidTransition
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`ConcurrencyConflict`]: EngineError::ConcurrencyConflict
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`ExistingKey`]: EngineError::ExistingKey
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Currency not allowed: {0}")]
    CurrencyNotAllowed(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// `true` for bad input shape, rejected before any mutation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidSplit(_)
                | Self::InvalidAmount(_)
                | Self::CurrencyNotAllowed(_)
                | Self::CurrencyMismatch(_)
                | Self::InvalidTransition(_)
        )
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::InvalidSplit(a), Self::InvalidSplit(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::CurrencyNotAllowed(a), Self::CurrencyNotAllowed(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::InvalidTransition(a), Self::InvalidTransition(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::ConcurrencyConflict(a), Self::ConcurrencyConflict(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
