//! Record access over a single LMDB transaction.
//!
//! Keys are raw bytes. Composite keys join their string parts with `/`,
//! which no identifier may contain, and end in a big-endian integer where
//! ordering matters.

use heed::{RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use bounty_store::{
    AccountKey, AuditEvent, LedgerAccount, LedgerEntry, LedgerRead, LedgerTxn, MilestoneRecord,
    NewEntry, OutboxMessage, StakeRecord, StoreError, SubmissionRecord, TaskRecord, WorkerRecord,
};
use bounty_types::{Chain, EntryId, SubmissionId, TaskId, Timestamp, WorkerId};

use crate::environment::Databases;
use crate::LmdbError;

const OUTBOX_SEQ_KEY: &[u8] = b"outbox_seq";

/// Anything that can be read through as an LMDB read transaction.
pub trait ReadTxn {
    fn ro(&self) -> &RoTxn<'_>;
}

impl ReadTxn for RoTxn<'_> {
    fn ro(&self) -> &RoTxn<'_> {
        self
    }
}

impl ReadTxn for RwTxn<'_> {
    fn ro(&self) -> &RoTxn<'_> {
        self
    }
}

/// A read or write transaction plus the database handles.
pub struct LmdbTxn<'a, T> {
    dbs: &'a Databases,
    txn: T,
}

impl<'a, T> LmdbTxn<'a, T> {
    pub(crate) fn new(dbs: &'a Databases, txn: T) -> Self {
        Self { dbs, txn }
    }

    pub(crate) fn into_inner(self) -> T {
        self.txn
    }
}

fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| LmdbError::Serialization(e.to_string()).into())
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, StoreError> {
    bincode::deserialize(bytes).map_err(|e| LmdbError::Serialization(e.to_string()).into())
}

fn heed_err(e: heed::Error) -> StoreError {
    LmdbError::from(e).into()
}

fn composite(prefix: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    key.extend_from_slice(prefix.as_bytes());
    key.push(b'/');
    key.extend_from_slice(suffix);
    key
}

fn prefix_of(part: &str) -> Vec<u8> {
    composite(part, &[])
}

/// Trailing big-endian u64 of an index key.
fn trailing_id(key: &[u8]) -> Result<EntryId, StoreError> {
    let start = key
        .len()
        .checked_sub(8)
        .ok_or_else(|| StoreError::Corruption("index key shorter than an entry id".into()))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[start..]);
    Ok(EntryId(u64::from_be_bytes(buf)))
}

fn read_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    if bytes.len() != 8 {
        return Err(StoreError::Corruption(format!(
            "expected 8 bytes, found {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

impl<T: ReadTxn> LmdbTxn<'_, T> {
    fn get_record<V: DeserializeOwned>(
        &self,
        db: heed::Database<heed::types::Bytes, heed::types::Bytes>,
        key: &[u8],
    ) -> Result<Option<V>, StoreError> {
        match db.get(self.txn.ro(), key).map_err(heed_err)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn all_records<V: DeserializeOwned>(
        &self,
        db: heed::Database<heed::types::Bytes, heed::types::Bytes>,
    ) -> Result<Vec<V>, StoreError> {
        let mut out = Vec::new();
        for item in db.iter(self.txn.ro()).map_err(heed_err)? {
            let (_, bytes) = item.map_err(heed_err)?;
            out.push(decode(bytes)?);
        }
        Ok(out)
    }

    fn entries_by_index(
        &self,
        index: heed::Database<heed::types::Bytes, heed::types::Bytes>,
        prefix: &[u8],
        newest_first: bool,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let ro = self.txn.ro();
        let mut ids = Vec::new();
        if newest_first {
            for item in index.rev_prefix_iter(ro, prefix).map_err(heed_err)? {
                if ids.len() >= limit {
                    break;
                }
                let (key, _) = item.map_err(heed_err)?;
                ids.push(trailing_id(key)?);
            }
        } else {
            for item in index.prefix_iter(ro, prefix).map_err(heed_err)? {
                if ids.len() >= limit {
                    break;
                }
                let (key, _) = item.map_err(heed_err)?;
                ids.push(trailing_id(key)?);
            }
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = self.entry(id)?.ok_or_else(|| {
                StoreError::Corruption(format!("index points at missing entry {}", id.0))
            })?;
            out.push(entry);
        }
        Ok(out)
    }
}

impl<T: ReadTxn> LedgerRead for LmdbTxn<'_, T> {
    fn account(&self, key: &AccountKey) -> Result<Option<LedgerAccount>, StoreError> {
        self.get_record(self.dbs.accounts, key.storage_key().as_bytes())
    }

    fn accounts(&self) -> Result<Vec<LedgerAccount>, StoreError> {
        self.all_records(self.dbs.accounts)
    }

    fn entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        self.get_record(self.dbs.entries, &id.0.to_be_bytes())
    }

    fn recent_entries(
        &self,
        chain: Option<Chain>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        if let Some(chain) = chain {
            return self.entries_by_index(
                self.dbs.chain_entries,
                &prefix_of(chain.as_str()),
                true,
                limit,
            );
        }
        let mut out = Vec::new();
        for item in self.dbs.entries.rev_iter(self.txn.ro()).map_err(heed_err)? {
            if out.len() >= limit {
                break;
            }
            let (_, bytes) = item.map_err(heed_err)?;
            out.push(decode(bytes)?);
        }
        Ok(out)
    }

    fn entries_for_task(&self, task: &TaskId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.entries_by_index(
            self.dbs.task_entries,
            &prefix_of(task.as_str()),
            false,
            usize::MAX,
        )
    }

    fn entry_count(&self) -> Result<u64, StoreError> {
        self.dbs.entries.len(self.txn.ro()).map_err(heed_err)
    }

    fn idempotency_key(&self, key: &str) -> Result<Option<EntryId>, StoreError> {
        match self
            .dbs
            .idempotency
            .get(self.txn.ro(), key.as_bytes())
            .map_err(heed_err)?
        {
            Some(bytes) => Ok(Some(EntryId(read_u64(bytes)?))),
            None => Ok(None),
        }
    }

    fn task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.get_record(self.dbs.tasks, id.as_str().as_bytes())
    }

    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.all_records(self.dbs.tasks)
    }

    fn milestones(&self, task: &TaskId) -> Result<Vec<MilestoneRecord>, StoreError> {
        let prefix = prefix_of(task.as_str());
        let mut out = Vec::new();
        for item in self
            .dbs
            .milestones
            .prefix_iter(self.txn.ro(), &prefix)
            .map_err(heed_err)?
        {
            let (_, bytes) = item.map_err(heed_err)?;
            out.push(decode(bytes)?);
        }
        Ok(out)
    }

    fn submission(&self, id: &SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        self.get_record(self.dbs.submissions, id.as_str().as_bytes())
    }

    fn stake(&self, task: &TaskId, worker: &WorkerId) -> Result<Option<StakeRecord>, StoreError> {
        let key = composite(task.as_str(), worker.as_str().as_bytes());
        self.get_record(self.dbs.stakes, &key)
    }

    fn worker(&self, id: &WorkerId) -> Result<Option<WorkerRecord>, StoreError> {
        self.get_record(self.dbs.workers, id.as_str().as_bytes())
    }

    fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        let mut out = Vec::new();
        for item in self.dbs.outbox.iter(self.txn.ro()).map_err(heed_err)? {
            if out.len() >= limit {
                break;
            }
            let (_, bytes) = item.map_err(heed_err)?;
            out.push(decode(bytes)?);
        }
        Ok(out)
    }
}

impl LmdbTxn<'_, RwTxn<'_>> {
    fn put_record<V: Serialize>(
        &mut self,
        db: heed::Database<heed::types::Bytes, heed::types::Bytes>,
        key: &[u8],
        value: &V,
    ) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        db.put(&mut self.txn, key, &bytes).map_err(heed_err)
    }

    fn next_entry_id(&self) -> Result<EntryId, StoreError> {
        match self.dbs.entries.last(self.txn.ro()).map_err(heed_err)? {
            Some((key, _)) => Ok(EntryId(read_u64(key)? + 1)),
            None => Ok(EntryId(1)),
        }
    }
}

impl LedgerTxn for LmdbTxn<'_, RwTxn<'_>> {
    fn put_account(&mut self, account: &LedgerAccount) -> Result<(), StoreError> {
        let key = account.key.storage_key();
        self.put_record(self.dbs.accounts, key.as_bytes(), account)
    }

    fn append_entry(&mut self, entry: NewEntry) -> Result<EntryId, StoreError> {
        let id = self.next_entry_id()?;
        let id_bytes = id.0.to_be_bytes();
        let stored = LedgerEntry::from_new(id, entry);

        self.put_record(self.dbs.entries, &id_bytes, &stored)?;
        let chain_key = composite(stored.chain.as_str(), &id_bytes);
        self.dbs
            .chain_entries
            .put(&mut self.txn, &chain_key, &[])
            .map_err(heed_err)?;
        if let Some(task) = &stored.task_id {
            let task_key = composite(task.as_str(), &id_bytes);
            self.dbs
                .task_entries
                .put(&mut self.txn, &task_key, &[])
                .map_err(heed_err)?;
        }
        Ok(id)
    }

    fn insert_idempotency_key(&mut self, key: &str, entry: EntryId) -> Result<bool, StoreError> {
        if self.idempotency_key(key)?.is_some() {
            return Ok(false);
        }
        self.dbs
            .idempotency
            .put(&mut self.txn, key.as_bytes(), &entry.0.to_be_bytes())
            .map_err(heed_err)?;
        Ok(true)
    }

    fn put_task(&mut self, task: &TaskRecord) -> Result<(), StoreError> {
        self.put_record(self.dbs.tasks, task.id.as_str().as_bytes(), task)
    }

    fn put_milestone(&mut self, milestone: &MilestoneRecord) -> Result<(), StoreError> {
        let key = composite(
            milestone.task_id.as_str(),
            &milestone.order_index.to_be_bytes(),
        );
        self.put_record(self.dbs.milestones, &key, milestone)
    }

    fn put_submission(&mut self, submission: &SubmissionRecord) -> Result<(), StoreError> {
        self.put_record(
            self.dbs.submissions,
            submission.id.as_str().as_bytes(),
            submission,
        )
    }

    fn put_stake(&mut self, stake: &StakeRecord) -> Result<(), StoreError> {
        let key = composite(stake.task_id.as_str(), stake.worker.as_str().as_bytes());
        self.put_record(self.dbs.stakes, &key, stake)
    }

    fn put_worker(&mut self, worker: &WorkerRecord) -> Result<(), StoreError> {
        self.put_record(self.dbs.workers, worker.id.as_str().as_bytes(), worker)
    }

    fn push_outbox(&mut self, event: AuditEvent, now: Timestamp) -> Result<u64, StoreError> {
        let last = match self
            .dbs
            .meta
            .get(self.txn.ro(), OUTBOX_SEQ_KEY)
            .map_err(heed_err)?
        {
            Some(bytes) => read_u64(bytes)?,
            None => 0,
        };
        let seq = last + 1;
        self.dbs
            .meta
            .put(&mut self.txn, OUTBOX_SEQ_KEY, &seq.to_be_bytes())
            .map_err(heed_err)?;

        let message = OutboxMessage {
            seq,
            event,
            created_at: now,
        };
        self.put_record(self.dbs.outbox, &seq.to_be_bytes(), &message)?;
        Ok(seq)
    }

    fn ack_outbox(&mut self, seq: u64) -> Result<(), StoreError> {
        self.dbs
            .outbox
            .delete(&mut self.txn, &seq.to_be_bytes())
            .map_err(heed_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bounty_store::{LedgerStore, StakeMeta, TaskStatus};
    use bounty_types::Amount;

    use crate::LmdbEnvironment;

    use super::*;

    fn open(dir: &std::path::Path) -> LmdbEnvironment {
        LmdbEnvironment::open(dir, 16, 10 * 1024 * 1024).unwrap()
    }

    fn lock_entry(worker: &str, task: &str, chain: Chain, units: u64) -> NewEntry {
        NewEntry::stake_lock(
            &WorkerId::new(worker).unwrap(),
            chain,
            Amount::from_units(units),
            StakeMeta {
                task_id: TaskId::new(task).unwrap(),
                milestone_id: None,
            },
            Timestamp::new(units),
        )
    }

    #[test]
    fn entries_are_indexed_by_chain_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(dir.path());
        env.write(|txn| {
            txn.append_entry(lock_entry("w1", "T1", Chain::Eth, 1))?;
            txn.append_entry(lock_entry("w1", "T2", Chain::Btc, 2))?;
            txn.append_entry(lock_entry("w2", "T1", Chain::Eth, 3))?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let eth = env.read(|r| r.recent_entries(Some(Chain::Eth), 10)).unwrap();
        assert_eq!(eth.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![3, 1]);

        let all = env.read(|r| r.recent_entries(None, 2)).unwrap();
        assert_eq!(all.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![3, 2]);

        let t1 = env
            .read(|r| r.entries_for_task(&TaskId::new("T1").unwrap()))
            .unwrap();
        assert_eq!(t1.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(env.read(|r| r.entry_count()).unwrap(), 3);
    }

    #[test]
    fn aborted_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(dir.path());
        let result: Result<(), StoreError> = env.write(|txn| {
            txn.append_entry(lock_entry("w1", "T1", Chain::Eth, 1))?;
            txn.insert_idempotency_key("escrow_lock_T1", EntryId(1))?;
            Err(StoreError::Backend("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(env.read(|r| r.entry_count()).unwrap(), 0);
        assert!(env
            .read(|r| r.idempotency_key("escrow_lock_T1"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn idempotency_key_is_claimed_once() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(dir.path());
        assert!(env
            .write(|txn| txn.insert_idempotency_key("deposit_ETH_0xabc", EntryId(4)))
            .unwrap());
        assert!(!env
            .write(|txn| txn.insert_idempotency_key("deposit_ETH_0xabc", EntryId(9)))
            .unwrap());
        assert_eq!(
            env.read(|r| r.idempotency_key("deposit_ETH_0xabc")).unwrap(),
            Some(EntryId(4))
        );
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = AccountKey::worker(&WorkerId::new("alice").unwrap(), Chain::Usd);
        {
            let env = open(dir.path());
            env.write(|txn| {
                let mut account = LedgerAccount::new(key.clone(), Timestamp::new(1));
                account.available = Amount::parse("12.5").unwrap();
                txn.put_account(&account)?;
                txn.append_entry(lock_entry("alice", "T1", Chain::Usd, 1))?;
                txn.push_outbox(
                    AuditEvent::TaskStatusChanged {
                        task_id: TaskId::new("T1").unwrap(),
                        from: None,
                        to: TaskStatus::Open,
                    },
                    Timestamp::new(1),
                )
            })
            .unwrap();
        }

        let env = open(dir.path());
        let account = env.read(|r| r.account(&key)).unwrap().unwrap();
        assert_eq!(account.available, Amount::parse("12.5").unwrap());
        assert_eq!(env.read(|r| r.pending_outbox(10)).unwrap().len(), 1);

        // Ids and sequence numbers continue past what is already stored.
        let (id, seq) = env
            .write(|txn| {
                let id = txn.append_entry(lock_entry("alice", "T2", Chain::Usd, 2))?;
                txn.ack_outbox(1)?;
                let seq = txn.push_outbox(
                    AuditEvent::TaskStatusChanged {
                        task_id: TaskId::new("T2").unwrap(),
                        from: None,
                        to: TaskStatus::Open,
                    },
                    Timestamp::new(2),
                )?;
                Ok::<_, StoreError>((id, seq))
            })
            .unwrap();
        assert_eq!(id, EntryId(2));
        assert_eq!(seq, 2);
    }

    #[test]
    fn milestones_come_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(dir.path());
        let task = TaskId::new("T1").unwrap();
        env.write(|txn| {
            for order in [2u32, 0, 1] {
                txn.put_milestone(&MilestoneRecord {
                    id: bounty_types::MilestoneId::new(format!("M{order}")).unwrap(),
                    task_id: task.clone(),
                    order_index: order,
                    title: format!("step {order}"),
                    reward: Amount::from_units(1),
                    stake: Amount::ZERO,
                    status: bounty_store::MilestoneStatus::Pending,
                    worker_attempts: Default::default(),
                    max_attempts_per_worker: 3,
                })?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
        let ms = env.read(|r| r.milestones(&task)).unwrap();
        assert_eq!(
            ms.iter().map(|m| m.order_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
