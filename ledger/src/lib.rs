//! Ledger accounts and the entry journal.
//!
//! Every function here operates inside a caller-supplied write transaction
//! ([`bounty_store::LedgerTxn`]). An account mutation reads the current
//! snapshot, computes both new balances, validates them, and writes the
//! account back as one record, so no balance is ever observed half-updated.
//! Journal writes append an immutable entry and queue the matching audit
//! event in the outbox within the same transaction.

pub mod accounts;
pub mod error;
pub mod journal;

pub use error::LedgerError;
