//! Nullable store: thread-safe in-memory storage.
//!
//! A single mutex serialises writers. Each write runs against a staged copy
//! of the state which replaces the live state only when the closure returns
//! `Ok`, so a failed command leaves no partial writes behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use bounty_store::{
    AccountKey, AuditEvent, LedgerAccount, LedgerEntry, LedgerRead, LedgerStore, LedgerTxn,
    MilestoneRecord, NewEntry, OutboxMessage, StakeRecord, StoreError, SubmissionRecord,
    TaskRecord, WorkerRecord,
};
use bounty_types::{Chain, EntryId, SubmissionId, TaskId, Timestamp, WorkerId};

#[derive(Clone, Default)]
struct MemState {
    accounts: BTreeMap<AccountKey, LedgerAccount>,
    entries: Vec<LedgerEntry>,
    idempotency: HashMap<String, EntryId>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    milestones: BTreeMap<TaskId, BTreeMap<u32, MilestoneRecord>>,
    submissions: BTreeMap<SubmissionId, SubmissionRecord>,
    stakes: BTreeMap<(TaskId, WorkerId), StakeRecord>,
    workers: BTreeMap<WorkerId, WorkerRecord>,
    outbox: BTreeMap<u64, OutboxMessage>,
    next_outbox_seq: u64,
}

/// An in-memory ledger store for testing and ephemeral deployments.
#[derive(Default)]
pub struct NullStore {
    state: Mutex<MemState>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        // A panic inside a write only ever touched the staged copy.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerStore for NullStore {
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn LedgerRead) -> Result<R, E>,
    {
        let guard = self.lock();
        f(&*guard)
    }

    fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTxn) -> Result<R, E>,
    {
        let mut guard = self.lock();
        let mut staged = guard.clone();
        let result = f(&mut staged)?;
        *guard = staged;
        Ok(result)
    }
}

impl LedgerRead for MemState {
    fn account(&self, key: &AccountKey) -> Result<Option<LedgerAccount>, StoreError> {
        Ok(self.accounts.get(key).cloned())
    }

    fn accounts(&self) -> Result<Vec<LedgerAccount>, StoreError> {
        Ok(self.accounts.values().cloned().collect())
    }

    fn entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        // Ids are 1-based and dense.
        let index = match id.0.checked_sub(1) {
            Some(index) => index as usize,
            None => return Ok(None),
        };
        Ok(self.entries.get(index).cloned())
    }

    fn recent_entries(
        &self,
        chain: Option<Chain>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .iter()
            .rev()
            .filter(|e| chain.map_or(true, |c| e.chain == c))
            .take(limit)
            .cloned()
            .collect())
    }

    fn entries_for_task(&self, task: &TaskId) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.task_id.as_ref() == Some(task))
            .cloned()
            .collect())
    }

    fn entry_count(&self) -> Result<u64, StoreError> {
        Ok(self.entries.len() as u64)
    }

    fn idempotency_key(&self, key: &str) -> Result<Option<EntryId>, StoreError> {
        Ok(self.idempotency.get(key).copied())
    }

    fn task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks.get(id).cloned())
    }

    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.tasks.values().cloned().collect())
    }

    fn milestones(&self, task: &TaskId) -> Result<Vec<MilestoneRecord>, StoreError> {
        Ok(self
            .milestones
            .get(task)
            .map(|ms| ms.values().cloned().collect())
            .unwrap_or_default())
    }

    fn submission(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.submissions.get(id).cloned())
    }

    fn stake(&self, task: &TaskId, worker: &WorkerId) -> Result<Option<StakeRecord>, StoreError> {
        Ok(self.stakes.get(&(task.clone(), worker.clone())).cloned())
    }

    fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError> {
        Ok(self.workers.get(id).cloned())
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        Ok(self.outbox.values().take(limit).cloned().collect())
    }
}

impl LedgerTxn for MemState {
    fn put_account(&mut self, account: &LedgerAccount) -> Result<(), StoreError> {
        self.accounts.insert(account.key.clone(), account.clone());
        Ok(())
    }

    fn append_entry(&mut self, entry: NewEntry) -> Result<EntryId, StoreError> {
        let id = EntryId(self.entries.len() as u64 + 1);
        self.entries.push(LedgerEntry::from_new(id, entry));
        Ok(id)
    }

    fn insert_idempotency_key(&mut self, key: &str, entry: EntryId) -> Result<bool, StoreError> {
        if self.idempotency.contains_key(key) {
            return Ok(false);
        }
        self.idempotency.insert(key.to_string(), entry);
        Ok(true)
    }

    fn put_task(&mut self, task: &TaskRecord) -> Result<(), StoreError> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn put_milestone(&mut self, milestone: &MilestoneRecord) -> Result<(), StoreError> {
        self.milestones
            .entry(milestone.task_id.clone())
            .or_default()
            .insert(milestone.order_index, milestone.clone());
        Ok(())
    }

    fn put_submission(&mut self, submission: &SubmissionRecord) -> Result<(), StoreError> {
        self.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    fn put_stake(&mut self, stake: &StakeRecord) -> Result<(), StoreError> {
        self.stakes.insert(
            (stake.task_id.clone(), stake.worker.clone()),
            stake.clone(),
        );
        Ok(())
    }

    fn put_worker(&mut self, worker: &WorkerRecord) -> Result<(), StoreError> {
        self.workers.insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    fn push_outbox(&mut self, event: AuditEvent, now: Timestamp) -> Result<u64, StoreError> {
        self.next_outbox_seq += 1;
        let seq = self.next_outbox_seq;
        self.outbox.insert(
            seq,
            OutboxMessage {
                seq,
                event,
                created_at: now,
            },
        );
        Ok(seq)
    }

    fn ack_outbox(&mut self, seq: u64) -> Result<(), StoreError> {
        self.outbox.remove(&seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_types::Amount;

    fn key() -> AccountKey {
        AccountKey::worker(&WorkerId::new("w1").unwrap(), Chain::Eth)
    }

    #[test]
    fn committed_write_is_visible() {
        let store = NullStore::new();
        store
            .write(|txn| {
                let mut account = LedgerAccount::new(key(), Timestamp::new(1));
                account.available = Amount::from_units(5);
                txn.put_account(&account)
            })
            .unwrap();
        let account = store
            .read(|r| r.account(&key()))
            .unwrap()
            .expect("account persisted");
        assert_eq!(account.available, Amount::from_units(5));
    }

    #[test]
    fn failed_write_rolls_back_everything() {
        let store = NullStore::new();
        let result: Result<(), StoreError> = store.write(|txn| {
            txn.put_account(&LedgerAccount::new(key(), Timestamp::new(1)))?;
            txn.insert_idempotency_key("k", EntryId(1))?;
            Err(StoreError::Backend("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.read(|r| r.account(&key())).unwrap().is_none());
        assert!(store.read(|r| r.idempotency_key("k")).unwrap().is_none());
    }

    #[test]
    fn idempotency_key_is_insert_if_absent() {
        let store = NullStore::new();
        let first = store
            .write(|txn| txn.insert_idempotency_key("task_T1_S1", EntryId(1)))
            .unwrap();
        let second = store
            .write(|txn| txn.insert_idempotency_key("task_T1_S1", EntryId(2)))
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(
            store.read(|r| r.idempotency_key("task_T1_S1")).unwrap(),
            Some(EntryId(1))
        );
    }

    #[test]
    fn outbox_is_fifo_and_ackable() {
        let store = NullStore::new();
        store
            .write(|txn| {
                for n in 0..3 {
                    txn.push_outbox(
                        AuditEvent::TaskStatusChanged {
                            task_id: TaskId::new(format!("T{n}")).unwrap(),
                            from: None,
                            to: bounty_store::TaskStatus::Open,
                        },
                        Timestamp::new(n),
                    )?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();
        let pending = store.read(|r| r.pending_outbox(10)).unwrap();
        assert_eq!(pending.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        store.write(|txn| txn.ack_outbox(1)).unwrap();
        assert_eq!(store.read(|r| r.pending_outbox(10)).unwrap().len(), 2);
    }
}
