//! Task-reward escrow held for the creator.
//!
//! Lifecycle: `none -> locked` at creation, then either `locked -> refunded`
//! (cancellation or deadline expiry) or `locked -> paid` once settlements
//! and the remainder release have drained it. Settlements debit the
//! creator's locked balance directly; [`reserve_escrow`] tracks how much of
//! the escrow they have consumed.

use bounty_ledger::{accounts, journal};
use bounty_store::{AccountKey, AuditEvent, EscrowStatus, LedgerTxn, NewEntry, TaskRecord};
use bounty_types::{Amount, EntryId, TaskId, Timestamp};

use crate::EscrowError;

pub fn escrow_lock_key(task: &TaskId) -> String {
    format!("escrow_lock_{task}")
}

pub fn escrow_refund_key(task: &TaskId) -> String {
    format!("escrow_refund_{task}")
}

pub fn escrow_release_key(task: &TaskId) -> String {
    format!("escrow_release_{task}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { amount: Amount, entry: EntryId },
    AlreadyRefunded,
}

/// Escrow not yet consumed by settlements.
pub fn remaining_escrow(task: &TaskRecord) -> Result<Amount, EscrowError> {
    Ok(task
        .reward
        .checked_sub(task.escrow_spent)
        .map_err(bounty_ledger::LedgerError::from)?)
}

fn require_locked(task: &TaskRecord) -> Result<(), EscrowError> {
    if task.escrow_status != EscrowStatus::Locked {
        return Err(EscrowError::EscrowNotLocked {
            task: task.id.clone(),
            status: task.escrow_status,
        });
    }
    Ok(())
}

/// Move the full reward from the creator's available balance into escrow.
pub fn lock_escrow(
    txn: &mut dyn LedgerTxn,
    task: &mut TaskRecord,
    now: Timestamp,
) -> Result<EntryId, EscrowError> {
    if task.escrow_status != EscrowStatus::None {
        return Err(EscrowError::EscrowNotLocked {
            task: task.id.clone(),
            status: task.escrow_status,
        });
    }

    let key = AccountKey::worker(&task.creator, task.chain);
    accounts::move_available_to_locked(txn, &key, task.reward, now)?;
    let entry = journal::record_keyed(
        txn,
        &escrow_lock_key(&task.id),
        NewEntry::escrow_lock(&task.creator, task.chain, task.reward, &task.id, now),
        AuditEvent::EscrowLocked {
            creator: task.creator.clone(),
            task_id: task.id.clone(),
            chain: task.chain,
            amount: task.reward,
        },
    )?;

    task.escrow_status = EscrowStatus::Locked;
    task.updated_at = now;
    txn.put_task(task)?;

    tracing::info!(
        task = %task.id,
        creator = %task.creator,
        chain = %task.chain,
        amount = %task.reward,
        "escrow locked"
    );
    Ok(entry)
}

/// Mark `amount` of the escrow as consumed by a settlement.
pub fn reserve_escrow(task: &mut TaskRecord, amount: Amount) -> Result<(), EscrowError> {
    require_locked(task)?;
    let remaining = remaining_escrow(task)?;
    if amount > remaining {
        return Err(EscrowError::EscrowExhausted {
            task: task.id.clone(),
            needed: amount,
            remaining,
        });
    }
    task.escrow_spent = task
        .escrow_spent
        .checked_add(amount)
        .map_err(bounty_ledger::LedgerError::from)?;
    Ok(())
}

/// Return the unspent escrow to the creator.
///
/// Guarded by both the escrow status and the `escrow_refund_<task>` key; a
/// repeated call reports [`RefundOutcome::AlreadyRefunded`] and writes nothing.
pub fn refund_escrow(
    txn: &mut dyn LedgerTxn,
    task: &mut TaskRecord,
    now: Timestamp,
) -> Result<RefundOutcome, EscrowError> {
    let refund_key = escrow_refund_key(&task.id);
    if task.escrow_status == EscrowStatus::Refunded || txn.idempotency_key(&refund_key)?.is_some()
    {
        tracing::debug!(task = %task.id, "escrow already refunded");
        return Ok(RefundOutcome::AlreadyRefunded);
    }
    require_locked(task)?;

    let amount = remaining_escrow(task)?;
    let key = AccountKey::worker(&task.creator, task.chain);
    accounts::move_locked_to_available(txn, &key, amount, now)?;
    let entry = journal::record_keyed(
        txn,
        &refund_key,
        NewEntry::escrow_unlock(&task.creator, task.chain, amount, &task.id, now),
        AuditEvent::EscrowRefunded {
            creator: task.creator.clone(),
            task_id: task.id.clone(),
            chain: task.chain,
            amount,
        },
    )?;

    task.escrow_status = EscrowStatus::Refunded;
    task.updated_at = now;
    txn.put_task(task)?;

    tracing::info!(
        task = %task.id,
        creator = %task.creator,
        chain = %task.chain,
        amount = %amount,
        "escrow refunded"
    );
    Ok(RefundOutcome::Refunded { amount, entry })
}

/// Release whatever settlements did not consume and mark the escrow paid.
///
/// Returns the released amount; nothing is journalled when it is zero.
pub fn release_escrow_remainder(
    txn: &mut dyn LedgerTxn,
    task: &mut TaskRecord,
    now: Timestamp,
) -> Result<Amount, EscrowError> {
    require_locked(task)?;

    let remainder = remaining_escrow(task)?;
    if !remainder.is_zero() {
        let key = AccountKey::worker(&task.creator, task.chain);
        accounts::move_locked_to_available(txn, &key, remainder, now)?;
        journal::record_keyed(
            txn,
            &escrow_release_key(&task.id),
            NewEntry::escrow_unlock(&task.creator, task.chain, remainder, &task.id, now),
            AuditEvent::EscrowReleased {
                creator: task.creator.clone(),
                task_id: task.id.clone(),
                chain: task.chain,
                remainder,
            },
        )?;
        task.escrow_spent = task.reward;
    }

    task.escrow_status = EscrowStatus::Paid;
    task.updated_at = now;
    txn.put_task(task)?;

    tracing::info!(task = %task.id, remainder = %remainder, "escrow paid out");
    Ok(remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_ledger::LedgerError;
    use bounty_nullables::NullStore;
    use bounty_store::{LedgerRead, LedgerStore, StakeRequirement, TaskStatus};
    use bounty_types::{Chain, Percent, WorkerId};

    fn creator() -> WorkerId {
        WorkerId::new("creator").unwrap()
    }

    fn new_task(reward: &str) -> TaskRecord {
        TaskRecord {
            id: TaskId::new("T1").unwrap(),
            creator: creator(),
            title: "translate".into(),
            chain: Chain::Eth,
            reward: Amount::parse(reward).unwrap(),
            escrow_status: EscrowStatus::None,
            escrow_spent: Amount::ZERO,
            stake: StakeRequirement::Flat(Amount::ZERO),
            slash_percentage: Percent::ZERO,
            protocol_fee_bps: None,
            claim_timeout_minutes: 60,
            deadline: None,
            required_capabilities: Vec::new(),
            milestone_count: 0,
            status: TaskStatus::Open,
            claimed_by: None,
            claimed_at: None,
            created_at: Timestamp::new(0),
            updated_at: Timestamp::new(0),
        }
    }

    fn store_with(available: &str) -> NullStore {
        let store = NullStore::new();
        store
            .write(|txn| {
                accounts::credit_available(
                    txn,
                    &AccountKey::worker(&creator(), Chain::Eth),
                    Amount::parse(available).unwrap(),
                    Timestamp::new(0),
                )?;
                Ok::<_, LedgerError>(())
            })
            .unwrap();
        store
    }

    fn creator_balances(store: &NullStore) -> (String, String) {
        let a = store
            .read(|r| r.account(&AccountKey::worker(&creator(), Chain::Eth)))
            .unwrap()
            .unwrap();
        (a.available.to_string(), a.locked.to_string())
    }

    #[test]
    fn test_refund_happens_once() {
        let store = store_with("0.01");
        let mut task = new_task("0.01");
        let now = Timestamp::new(1);
        store
            .write(|txn| lock_escrow(txn, &mut task, now))
            .unwrap();
        assert_eq!(creator_balances(&store), ("0".into(), "0.01".into()));

        let first = store
            .write(|txn| refund_escrow(txn, &mut task, now))
            .unwrap();
        assert!(matches!(first, RefundOutcome::Refunded { .. }));

        // A stale copy of the record still carries `locked`; the key catches it.
        let mut stale = new_task("0.01");
        stale.escrow_status = EscrowStatus::Locked;
        let second = store
            .write(|txn| refund_escrow(txn, &mut stale, now))
            .unwrap();
        assert_eq!(second, RefundOutcome::AlreadyRefunded);
        assert_eq!(creator_balances(&store), ("0.01".into(), "0".into()));
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 2);
    }

    #[test]
    fn test_escrow_needs_creator_funds() {
        let store = store_with("0.5");
        let mut task = new_task("1");
        let err = store
            .write(|txn| lock_escrow(txn, &mut task, Timestamp::new(1)))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        assert!(store.read(|r| r.idempotency_key("escrow_lock_T1")).unwrap().is_none());
    }

    #[test]
    fn test_reserve_and_release_remainder() {
        let store = store_with("10");
        let mut task = new_task("10");
        let now = Timestamp::new(1);
        store
            .write(|txn| lock_escrow(txn, &mut task, now))
            .unwrap();

        reserve_escrow(&mut task, Amount::from_units(4)).unwrap();
        let err = reserve_escrow(&mut task, Amount::from_units(7)).unwrap_err();
        assert_eq!(err.code(), "escrow_exhausted");

        // Simulate the settlement consuming the reserved escrow.
        store
            .write(|txn| {
                accounts::debit_locked(
                    txn,
                    &AccountKey::worker(&creator(), Chain::Eth),
                    Amount::from_units(4),
                    now,
                )
            })
            .unwrap();

        let released = store
            .write(|txn| release_escrow_remainder(txn, &mut task, now))
            .unwrap();
        assert_eq!(released, Amount::from_units(6));
        assert_eq!(task.escrow_status, EscrowStatus::Paid);
        assert_eq!(creator_balances(&store), ("6".into(), "0".into()));

        let err = store
            .write(|txn| refund_escrow(txn, &mut task, now))
            .unwrap_err();
        assert_eq!(err.code(), "escrow_not_locked");
    }
}
