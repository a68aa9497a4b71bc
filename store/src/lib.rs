//! Storage records and transactional storage traits for the bounty engine.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`LedgerStore`]. The rest of the codebase depends only on these traits.
//!
//! All mutations happen inside [`LedgerStore::write`]: the closure receives a
//! [`LedgerTxn`], and either everything it wrote is committed or, when it
//! returns `Err`, nothing is. Backends serialise writers, so two commands can
//! never observe the same "before" state of an account, and the idempotency
//! key index is checked and claimed inside that same transaction.

pub mod account;
pub mod entry;
pub mod error;
pub mod outbox;
pub mod task;
pub mod worker;

pub use account::{AccountKey, LedgerAccount};
pub use entry::{
    DepositMeta, EntryMeta, EntryType, EscrowMeta, LedgerEntry, NewEntry, SettlementMeta,
    SlashMeta, StakeMeta, WithdrawalMeta,
};
pub use error::StoreError;
pub use outbox::{AuditEvent, OutboxMessage};
pub use task::{
    EscrowStatus, MilestoneRecord, MilestoneStatus, StakeRecord, StakeRequirement, StakeStatus,
    SubmissionRecord, SubmissionStatus, TaskRecord, TaskStatus,
};
pub use worker::WorkerRecord;

use bounty_types::{Chain, EntryId, SubmissionId, TaskId, Timestamp, WorkerId};

/// Read access to every record family.
pub trait LedgerRead {
    fn account(&self, key: &AccountKey) -> Result<Option<LedgerAccount>, StoreError>;
    fn accounts(&self) -> Result<Vec<LedgerAccount>, StoreError>;

    fn entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError>;
    /// Newest first, optionally restricted to one chain.
    fn recent_entries(
        &self,
        chain: Option<Chain>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
    /// Oldest first.
    fn entries_for_task(&self, task: &TaskId) -> Result<Vec<LedgerEntry>, StoreError>;
    fn entry_count(&self) -> Result<u64, StoreError>;

    /// The entry recorded under an idempotency key, if the key was ever claimed.
    fn idempotency_key(&self, key: &str) -> Result<Option<EntryId>, StoreError>;

    fn task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;
    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;
    /// Ordered by `order_index`.
    fn milestones(&self, task: &TaskId) -> Result<Vec<MilestoneRecord>, StoreError>;
    fn submission(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError>;
    fn stake(&self, task: &TaskId, worker: &WorkerId) -> Result<Option<StakeRecord>, StoreError>;
    fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError>;

    /// Undelivered outbox messages, oldest first.
    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError>;
}

/// A write transaction. Dropped without commit means rolled back.
pub trait LedgerTxn: LedgerRead {
    /// Write both balances of an account as one unit.
    fn put_account(&mut self, account: &LedgerAccount) -> Result<(), StoreError>;

    /// Append an entry and return its assigned id.
    fn append_entry(&mut self, entry: NewEntry) -> Result<EntryId, StoreError>;

    /// Insert-if-absent. Returns `false`, writing nothing, when the key exists.
    fn insert_idempotency_key(&mut self, key: &str, entry: EntryId) -> Result<bool, StoreError>;

    fn put_task(&mut self, task: &TaskRecord) -> Result<(), StoreError>;
    fn put_milestone(&mut self, milestone: &MilestoneRecord) -> Result<(), StoreError>;
    fn put_submission(&mut self, submission: &SubmissionRecord) -> Result<(), StoreError>;
    fn put_stake(&mut self, stake: &StakeRecord) -> Result<(), StoreError>;
    fn put_worker(&mut self, worker: &WorkerRecord) -> Result<(), StoreError>;

    fn push_outbox(&mut self, event: AuditEvent, now: Timestamp) -> Result<u64, StoreError>;
    fn ack_outbox(&mut self, seq: u64) -> Result<(), StoreError>;
}

/// A transactional backend with a single writer at a time.
pub trait LedgerStore: Send + Sync {
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn LedgerRead) -> Result<R, E>;

    fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<R, E>;
}

impl<S: LedgerStore> LedgerStore for std::sync::Arc<S> {
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn LedgerRead) -> Result<R, E>,
    {
        (**self).read(f)
    }

    fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<R, E>,
    {
        (**self).write(f)
    }
}
