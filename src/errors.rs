//! Error types for the fairdice betting core
//!
//! Every failure is surfaced to the caller of the seed, batch, or ledger
//! operation that raised it. Pure components (roll derivation, dice setup)
//! either return a value or fail with one of these variants.

use crate::types::{AccountId, Amount, Currency, OwnerId};

/// Root error type for all fairdice operations
#[derive(Debug, thiserror::Error)]
pub enum DiceError {
    /// Empty, malformed, or previously used server/client seed
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// Win probability outside the accepted open interval
    #[error("Invalid win probability {value}: must be within ({min}, {max})")]
    InvalidProbability {
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid bet direction '{0}': expected roll_under or roll_over")]
    InvalidDirection(String),

    #[error("Insufficient funds in {account} for {currency}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        currency: Currency,
        requested: Amount,
        available: Amount,
    },

    /// Unsupported currency ticker
    #[error("Unsupported currency ticker: {0}")]
    BadCurrency(String),

    /// Per-owner lock could not be taken in time; the caller should retry
    #[error("Concurrent operation in progress for owner {owner}, retry later")]
    ConcurrencyConflict { owner: OwnerId },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown owner: {0}")]
    UnknownOwner(OwnerId),

    #[error("Seed encryption failed: {0}")]
    Encryption(String),

    #[error("Seed storage failed: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl DiceError {
    /// True when the operation failed only because of contention and can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiceError::ConcurrencyConflict { .. })
    }
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

// Convenience type alias for Results
pub type DiceResult<T> = Result<T, DiceError>;
