//! LMDB storage backend for the bounty engine.
//!
//! Implements [`bounty_store::LedgerStore`] using the `heed` LMDB bindings.
//! Each record family maps to one LMDB database within a single environment.
//! LMDB allows one write transaction at a time, which is what serialises
//! every ledger command; a transaction dropped without commit is aborted.

pub mod environment;
pub mod error;
pub mod txn;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
