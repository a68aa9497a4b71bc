//! Escrow and stake controller.
//!
//! Two kinds of funds are held against a task:
//!
//! - **Stake**: posted by the claiming worker, moved from available to
//!   locked on claim, and either returned (unlock) or split between the
//!   worker and the protocol (slash). Each (task, worker) pair carries an
//!   explicit [`bounty_store::StakeRecord`], so unlock and slash never have
//!   to guess whether a lock happened.
//! - **Task escrow**: the reward posted by the creator, locked at task
//!   creation and consumed by settlements, refunded on cancellation or
//!   expiry, or released back to the creator once the task is paid out.
//!
//! All operations run inside the caller's write transaction.

pub mod error;
pub mod stake;
pub mod task_escrow;

pub use error::EscrowError;
pub use stake::{lock_stake, slash_stake, unlock_stake, StakeOutcome};
pub use task_escrow::{
    escrow_lock_key, escrow_refund_key, escrow_release_key, lock_escrow, refund_escrow,
    release_escrow_remainder, remaining_escrow, reserve_escrow, RefundOutcome,
};
