use bounty_ledger::LedgerError;
use bounty_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("settlement {0} is recorded without settlement metadata")]
    CorruptRecord(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl SettlementError {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::InvalidAmount(_) => "invalid_amount",
            SettlementError::CorruptRecord(_) => "corrupt_record",
            SettlementError::Ledger(e) => e.code(),
            SettlementError::Storage(_) => "storage_error",
        }
    }
}
