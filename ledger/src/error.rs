use bounty_store::StoreError;
use bounty_types::{Amount, AmountError, RateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance: need {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid percentage: {0}")]
    InvalidPercentage(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("idempotency key already used: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidPercentage(_) => "invalid_percentage",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::Duplicate(_) => "duplicate",
            LedgerError::Storage(_) => "storage_error",
        }
    }
}

impl From<AmountError> for LedgerError {
    fn from(e: AmountError) -> Self {
        LedgerError::InvalidAmount(e.to_string())
    }
}

impl From<RateError> for LedgerError {
    fn from(e: RateError) -> Self {
        LedgerError::InvalidPercentage(e.to_string())
    }
}
