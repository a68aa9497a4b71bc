use thiserror::Error;

use bounty_escrow::EscrowError;
use bounty_ledger::LedgerError;
use bounty_market::MarketError;
use bounty_settlement::SettlementError;
use bounty_store::StoreError;
use bounty_store_lmdb::LmdbError;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("escrow error: {0}")]
    Escrow(#[from] EscrowError),

    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("market error: {0}")]
    Market(#[from] MarketError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] LmdbError),

    #[error("chain provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Background(String),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}

impl NodeError {
    /// Stable machine-readable code, delegating to the wrapped error.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Ledger(e) => e.code(),
            NodeError::Escrow(e) => e.code(),
            NodeError::Settlement(e) => e.code(),
            NodeError::Market(e) => e.code(),
            NodeError::Store(_) | NodeError::Lmdb(_) => "storage_error",
            NodeError::Provider(_) => "provider_error",
            NodeError::Metrics(_) => "metrics_error",
            NodeError::InvalidRequest(_) => "invalid_request",
            NodeError::Config(_) => "config_error",
            NodeError::Io(_) => "io_error",
            NodeError::Background(_) => "background_error",
            NodeError::ShutdownTimeout => "shutdown_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_types::{Amount, TaskId, WorkerId};

    #[test]
    fn codes_pass_through_wrappers() {
        let err = NodeError::from(EscrowError::Ledger(LedgerError::InsufficientBalance {
            needed: Amount::parse("1").unwrap(),
            available: Amount::ZERO,
        }));
        assert_eq!(err.code(), "insufficient_balance");

        let err = NodeError::from(MarketError::ClaimExpired {
            task: TaskId::new("T1").unwrap(),
            worker: WorkerId::new("w1").unwrap(),
        });
        assert_eq!(err.code(), "claim_expired");

        let err = NodeError::from(StoreError::Backend("disk".into()));
        assert_eq!(err.code(), "storage_error");
    }
}
