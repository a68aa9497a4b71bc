//! The append-only entry journal and its idempotency keys.

use bounty_store::{AuditEvent, LedgerEntry, LedgerRead, LedgerTxn, NewEntry};
use bounty_types::{Chain, EntryId, TaskId};

use crate::LedgerError;

/// Largest page `list_entries` will return.
pub const MAX_ENTRY_PAGE: usize = 500;

/// Append an entry and queue its audit event.
pub fn record(
    txn: &mut dyn LedgerTxn,
    entry: NewEntry,
    event: AuditEvent,
) -> Result<EntryId, LedgerError> {
    let now = entry.created_at;
    let entry_type = entry.entry_type;
    let chain = entry.chain;
    let amount = entry.amount;

    let id = txn.append_entry(entry)?;
    txn.push_outbox(event, now)?;

    tracing::debug!(
        entry = id.0,
        kind = entry_type.as_str(),
        chain = %chain,
        amount = %amount,
        "journal entry appended"
    );
    Ok(id)
}

/// Append an entry and claim `key` for it in the same transaction.
///
/// Fails with [`LedgerError::Duplicate`] if the key was already claimed;
/// the caller's transaction must then be rolled back.
pub fn record_keyed(
    txn: &mut dyn LedgerTxn,
    key: &str,
    entry: NewEntry,
    event: AuditEvent,
) -> Result<EntryId, LedgerError> {
    if txn.idempotency_key(key)?.is_some() {
        return Err(LedgerError::Duplicate(key.to_string()));
    }
    let id = record(txn, entry, event)?;
    if !txn.insert_idempotency_key(key, id)? {
        return Err(LedgerError::Duplicate(key.to_string()));
    }
    Ok(id)
}

/// The entry first recorded under `key`.
pub fn lookup_key<R: LedgerRead + ?Sized>(
    reader: &R,
    key: &str,
) -> Result<Option<LedgerEntry>, LedgerError> {
    match reader.idempotency_key(key)? {
        Some(id) => Ok(reader.entry(id)?),
        None => Ok(None),
    }
}

/// Newest entries first, with `limit` clamped to `1..=max_page`.
pub fn list_entries<R: LedgerRead + ?Sized>(
    reader: &R,
    chain: Option<Chain>,
    limit: usize,
    max_page: usize,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let limit = limit.clamp(1, max_page.clamp(1, MAX_ENTRY_PAGE));
    Ok(reader.recent_entries(chain, limit)?)
}

pub fn entries_for_task<R: LedgerRead + ?Sized>(
    reader: &R,
    task: &TaskId,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    Ok(reader.entries_for_task(task)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_nullables::NullStore;
    use bounty_store::{LedgerStore, StakeMeta};
    use bounty_types::{Amount, Timestamp, WorkerId};

    fn lock(task: &str, chain: Chain) -> (NewEntry, AuditEvent) {
        let worker = WorkerId::new("w1").unwrap();
        let task_id = TaskId::new(task).unwrap();
        let amount = Amount::parse("0.5").unwrap();
        let entry = NewEntry::stake_lock(
            &worker,
            chain,
            amount,
            StakeMeta {
                task_id: task_id.clone(),
                milestone_id: None,
            },
            Timestamp::new(7),
        );
        let event = AuditEvent::StakeLocked {
            worker,
            task_id,
            milestone_id: None,
            chain,
            amount,
        };
        (entry, event)
    }

    #[test]
    fn record_queues_the_audit_event() {
        let store = NullStore::new();
        let (entry, event) = lock("T1", Chain::Eth);
        let id = store.write(|txn| record(txn, entry, event.clone())).unwrap();

        assert_eq!(id, EntryId(1));
        let outbox = store.read(|r| r.pending_outbox(10)).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].event, event);
    }

    #[test]
    fn keyed_record_rejects_reused_key() {
        let store = NullStore::new();
        let (entry, event) = lock("T1", Chain::Eth);
        store
            .write(|txn| record_keyed(txn, "escrow_lock_T1", entry.clone(), event.clone()))
            .unwrap();

        let err = store
            .write(|txn| record_keyed(txn, "escrow_lock_T1", entry, event))
            .unwrap_err();
        assert_eq!(err.code(), "duplicate");
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 1);
        assert_eq!(store.read(|r| r.pending_outbox(10)).unwrap().len(), 1);

        let found = store
            .read(|r| lookup_key(r, "escrow_lock_T1"))
            .unwrap()
            .expect("keyed entry");
        assert_eq!(found.id, EntryId(1));
    }

    #[test]
    fn list_entries_clamps_limit() {
        let store = NullStore::new();
        store
            .write(|txn| {
                for n in 0..5 {
                    let chain = if n % 2 == 0 { Chain::Eth } else { Chain::Btc };
                    let (entry, event) = lock(&format!("T{n}"), chain);
                    record(txn, entry, event)?;
                }
                Ok::<_, LedgerError>(())
            })
            .unwrap();

        let zero = store.read(|r| list_entries(r, None, 0, 500)).unwrap();
        assert_eq!(zero.len(), 1);
        assert_eq!(zero[0].id, EntryId(5));

        let huge = store.read(|r| list_entries(r, None, 10_000, 3)).unwrap();
        assert_eq!(huge.len(), 3);

        let btc = store
            .read(|r| list_entries(r, Some(Chain::Btc), 50, 500))
            .unwrap();
        assert_eq!(
            btc.iter().map(|e| e.id.0).collect::<Vec<_>>(),
            vec![4, 2]
        );
    }

    #[test]
    fn entries_for_task_are_oldest_first() {
        let store = NullStore::new();
        store
            .write(|txn| {
                for task in ["T1", "T2", "T1"] {
                    let (entry, event) = lock(task, Chain::Eth);
                    record(txn, entry, event)?;
                }
                Ok::<_, LedgerError>(())
            })
            .unwrap();
        let entries = store
            .read(|r| entries_for_task(r, &TaskId::new("T1").unwrap()))
            .unwrap();
        assert_eq!(
            entries.iter().map(|e| e.id.0).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }
}
