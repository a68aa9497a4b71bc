use bounty_ledger::LedgerError;
use bounty_store::{EscrowStatus, StoreError};
use bounty_types::{Amount, TaskId, WorkerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("worker {worker} has no active stake on task {task}")]
    NoActiveStake { task: TaskId, worker: WorkerId },

    #[error("worker {worker} already has stake locked on task {task}")]
    StakeAlreadyLocked { task: TaskId, worker: WorkerId },

    #[error("escrow for task {task} is {status:?}, expected locked")]
    EscrowNotLocked { task: TaskId, status: EscrowStatus },

    #[error("escrow for task {task} cannot cover {needed}: {remaining} remaining")]
    EscrowExhausted {
        task: TaskId,
        needed: Amount,
        remaining: Amount,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EscrowError {
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::NoActiveStake { .. } => "no_active_stake",
            EscrowError::StakeAlreadyLocked { .. } => "stake_already_locked",
            EscrowError::EscrowNotLocked { .. } => "escrow_not_locked",
            EscrowError::EscrowExhausted { .. } => "escrow_exhausted",
            EscrowError::Ledger(e) => e.code(),
            EscrowError::Storage(_) => "storage_error",
        }
    }
}
