//! Worker stake: lock on claim, unlock on success or release, slash on failure.

use bounty_ledger::{accounts, journal};
use bounty_store::{
    AccountKey, AuditEvent, LedgerTxn, NewEntry, SlashMeta, StakeMeta, StakeRecord, StakeStatus,
    TaskRecord,
};
use bounty_types::{Amount, BasisPoints, EntryId, MilestoneId, Timestamp, WorkerId};

use crate::EscrowError;

/// What a stake operation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StakeOutcome {
    /// The task requires no stake; nothing was written.
    NotRequired,
    Locked {
        amount: Amount,
        entry: EntryId,
    },
    Unlocked {
        amount: Amount,
        entry: EntryId,
    },
    Slashed {
        locked: Amount,
        slashed: Amount,
        returned: Amount,
        entry: EntryId,
    },
}

/// Lock the task's required stake from the worker's available balance.
pub fn lock_stake(
    txn: &mut dyn LedgerTxn,
    task: &TaskRecord,
    worker: &WorkerId,
    milestone: Option<&MilestoneId>,
    now: Timestamp,
) -> Result<StakeOutcome, EscrowError> {
    let required = task.required_stake();
    if required.is_zero() {
        tracing::debug!(task = %task.id, worker = %worker, "no stake required");
        return Ok(StakeOutcome::NotRequired);
    }

    if let Some(existing) = txn.stake(&task.id, worker)? {
        if existing.is_locked() {
            return Err(EscrowError::StakeAlreadyLocked {
                task: task.id.clone(),
                worker: worker.clone(),
            });
        }
    }

    let key = AccountKey::worker(worker, task.chain);
    accounts::move_available_to_locked(txn, &key, required, now)?;

    txn.put_stake(&StakeRecord {
        task_id: task.id.clone(),
        worker: worker.clone(),
        chain: task.chain,
        amount: required,
        status: StakeStatus::Locked,
        locked_at: now,
        resolved_at: None,
    })?;

    let meta = StakeMeta {
        task_id: task.id.clone(),
        milestone_id: milestone.cloned(),
    };
    let entry = journal::record(
        txn,
        NewEntry::stake_lock(worker, task.chain, required, meta, now),
        AuditEvent::StakeLocked {
            worker: worker.clone(),
            task_id: task.id.clone(),
            milestone_id: milestone.cloned(),
            chain: task.chain,
            amount: required,
        },
    )?;

    tracing::info!(
        task = %task.id,
        worker = %worker,
        chain = %task.chain,
        amount = %required,
        "stake locked"
    );
    Ok(StakeOutcome::Locked {
        amount: required,
        entry,
    })
}

/// The locked stake for (task, worker), or `None` when no stake is required.
fn active_stake(
    txn: &dyn LedgerTxn,
    task: &TaskRecord,
    worker: &WorkerId,
) -> Result<Option<StakeRecord>, EscrowError> {
    match txn.stake(&task.id, worker)? {
        Some(record) if record.is_locked() => Ok(Some(record)),
        None if task.required_stake().is_zero() => Ok(None),
        _ => Err(EscrowError::NoActiveStake {
            task: task.id.clone(),
            worker: worker.clone(),
        }),
    }
}

/// Return the whole locked stake to the worker.
pub fn unlock_stake(
    txn: &mut dyn LedgerTxn,
    task: &TaskRecord,
    worker: &WorkerId,
    milestone: Option<&MilestoneId>,
    now: Timestamp,
) -> Result<StakeOutcome, EscrowError> {
    let Some(mut record) = active_stake(txn, task, worker)? else {
        tracing::debug!(task = %task.id, worker = %worker, "no stake to unlock");
        return Ok(StakeOutcome::NotRequired);
    };

    let key = AccountKey::worker(worker, record.chain);
    accounts::move_locked_to_available(txn, &key, record.amount, now)?;

    record.status = StakeStatus::Released;
    record.resolved_at = Some(now);
    txn.put_stake(&record)?;

    let meta = StakeMeta {
        task_id: task.id.clone(),
        milestone_id: milestone.cloned(),
    };
    let entry = journal::record(
        txn,
        NewEntry::stake_unlock(worker, record.chain, record.amount, meta, now),
        AuditEvent::StakeUnlocked {
            worker: worker.clone(),
            task_id: task.id.clone(),
            milestone_id: milestone.cloned(),
            chain: record.chain,
            amount: record.amount,
        },
    )?;

    tracing::info!(
        task = %task.id,
        worker = %worker,
        chain = %record.chain,
        amount = %record.amount,
        "stake unlocked"
    );
    Ok(StakeOutcome::Unlocked {
        amount: record.amount,
        entry,
    })
}

/// Slash `rate` of the locked stake to the protocol and return the rest.
///
/// The slashed part is `floor(locked * rate / 10000)`; rounding dust stays
/// with the worker, so `slashed + returned == locked` always holds.
pub fn slash_stake(
    txn: &mut dyn LedgerTxn,
    task: &TaskRecord,
    worker: &WorkerId,
    milestone: Option<&MilestoneId>,
    rate: BasisPoints,
    now: Timestamp,
) -> Result<StakeOutcome, EscrowError> {
    let Some(mut record) = active_stake(txn, task, worker)? else {
        tracing::debug!(task = %task.id, worker = %worker, "no stake to slash");
        return Ok(StakeOutcome::NotRequired);
    };

    let locked = record.amount;
    let (slashed, returned) = locked.split_bps(rate);
    let key = AccountKey::worker(worker, record.chain);

    accounts::debit_locked(txn, &key, locked, now)?;
    if !returned.is_zero() {
        accounts::credit_available(txn, &key, returned, now)?;
    }
    accounts::credit_protocol(txn, record.chain, slashed, now)?;

    record.status = StakeStatus::Slashed;
    record.resolved_at = Some(now);
    txn.put_stake(&record)?;

    let meta = SlashMeta {
        task_id: task.id.clone(),
        milestone_id: milestone.cloned(),
        locked,
        slashed,
        returned,
        rate,
    };
    let entry = journal::record(
        txn,
        NewEntry::slash(worker, record.chain, meta, now),
        AuditEvent::StakeSlashed {
            worker: worker.clone(),
            task_id: task.id.clone(),
            milestone_id: milestone.cloned(),
            chain: record.chain,
            slashed,
            returned,
        },
    )?;

    tracing::info!(
        task = %task.id,
        worker = %worker,
        chain = %record.chain,
        locked = %locked,
        slashed = %slashed,
        returned = %returned,
        "stake slashed"
    );
    Ok(StakeOutcome::Slashed {
        locked,
        slashed,
        returned,
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_ledger::{accounts, LedgerError};
    use bounty_nullables::NullStore;
    use bounty_store::{
        EntryMeta, EntryType, EscrowStatus, LedgerRead, LedgerStore, StakeRequirement, TaskStatus,
    };
    use bounty_types::{Chain, Percent, TaskId};

    fn task(stake: &str) -> TaskRecord {
        TaskRecord {
            id: TaskId::new("T1").unwrap(),
            creator: WorkerId::new("creator").unwrap(),
            title: "label images".into(),
            chain: Chain::Eth,
            reward: Amount::parse("1").unwrap(),
            escrow_status: EscrowStatus::Locked,
            escrow_spent: Amount::ZERO,
            stake: StakeRequirement::Flat(Amount::parse(stake).unwrap()),
            slash_percentage: Percent::new(50).unwrap(),
            protocol_fee_bps: None,
            claim_timeout_minutes: 60,
            deadline: None,
            required_capabilities: Vec::new(),
            milestone_count: 0,
            status: TaskStatus::Claimed,
            claimed_by: None,
            claimed_at: None,
            created_at: Timestamp::new(0),
            updated_at: Timestamp::new(0),
        }
    }

    fn worker() -> WorkerId {
        WorkerId::new("w1").unwrap()
    }

    fn funded_store(available: &str) -> NullStore {
        let store = NullStore::new();
        store
            .write(|txn| {
                accounts::bootstrap(txn, &Chain::ALL, Timestamp::new(0))?;
                accounts::credit_available(
                    txn,
                    &AccountKey::worker(&worker(), Chain::Eth),
                    Amount::parse(available).unwrap(),
                    Timestamp::new(0),
                )?;
                Ok::<_, LedgerError>(())
            })
            .unwrap();
        store
    }

    fn balances(store: &NullStore) -> (String, String) {
        let account = store
            .read(|r| r.account(&AccountKey::worker(&worker(), Chain::Eth)))
            .unwrap()
            .unwrap();
        (account.available.to_string(), account.locked.to_string())
    }

    fn protocol(store: &NullStore) -> String {
        store
            .read(|r| r.account(&AccountKey::protocol(Chain::Eth)))
            .unwrap()
            .unwrap()
            .available
            .to_string()
    }

    #[test]
    fn test_lock_and_unlock_round_trip() {
        let store = funded_store("0.05");
        let t = task("0.05");
        let now = Timestamp::new(5);

        let locked = store
            .write(|txn| lock_stake(txn, &t, &worker(), None, now))
            .unwrap();
        assert!(matches!(locked, StakeOutcome::Locked { .. }));
        assert_eq!(balances(&store), ("0".into(), "0.05".into()));

        store
            .write(|txn| unlock_stake(txn, &t, &worker(), None, now))
            .unwrap();
        assert_eq!(balances(&store), ("0.05".into(), "0".into()));

        let record = store
            .read(|r| r.stake(&t.id, &worker()))
            .unwrap()
            .unwrap();
        assert_eq!(record.status, StakeStatus::Released);
    }

    #[test]
    fn test_lock_requires_available_funds() {
        let store = funded_store("0.01");
        let err = store
            .write(|txn| lock_stake(txn, &task("0.05"), &worker(), None, Timestamp::new(1)))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        assert!(store
            .read(|r| r.stake(&task("0.05").id, &worker()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_double_lock_is_rejected() {
        let store = funded_store("1");
        let t = task("0.1");
        store
            .write(|txn| lock_stake(txn, &t, &worker(), None, Timestamp::new(1)))
            .unwrap();
        let err = store
            .write(|txn| lock_stake(txn, &t, &worker(), None, Timestamp::new(2)))
            .unwrap_err();
        assert_eq!(err.code(), "stake_already_locked");
        assert_eq!(balances(&store), ("0.9".into(), "0.1".into()));
    }

    #[test]
    fn test_zero_stake_is_a_no_op() {
        let store = funded_store("1");
        let t = task("0");
        let now = Timestamp::new(1);
        for outcome in [
            store.write(|txn| lock_stake(txn, &t, &worker(), None, now)),
            store.write(|txn| unlock_stake(txn, &t, &worker(), None, now)),
            store.write(|txn| slash_stake(txn, &t, &worker(), None, BasisPoints::FULL, now)),
        ] {
            assert_eq!(outcome.unwrap(), StakeOutcome::NotRequired);
        }
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 0);
    }

    #[test]
    fn test_unlock_without_lock_fails_loudly() {
        let store = funded_store("1");
        let err = store
            .write(|txn| unlock_stake(txn, &task("0.1"), &worker(), None, Timestamp::new(1)))
            .unwrap_err();
        assert_eq!(err.code(), "no_active_stake");
    }

    #[test]
    fn test_full_slash_goes_to_protocol() {
        let store = funded_store("0.02");
        let t = task("0.02");
        let now = Timestamp::new(3);
        store
            .write(|txn| lock_stake(txn, &t, &worker(), None, now))
            .unwrap();

        let outcome = store
            .write(|txn| {
                slash_stake(txn, &t, &worker(), None, Percent::HUNDRED.to_bps(), now)
            })
            .unwrap();
        match outcome {
            StakeOutcome::Slashed {
                slashed, returned, ..
            } => {
                assert_eq!(slashed.to_string(), "0.02");
                assert_eq!(returned.to_string(), "0");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(balances(&store), ("0".into(), "0".into()));
        assert_eq!(protocol(&store), "0.02");

        let entries = store.read(|r| r.recent_entries(None, 1)).unwrap();
        assert_eq!(entries[0].entry_type, EntryType::Slash);
        match &entries[0].meta {
            EntryMeta::Slash(meta) => {
                assert_eq!(meta.locked.to_string(), "0.02");
                assert_eq!(meta.returned, Amount::ZERO);
            }
            other => panic!("unexpected meta {other:?}"),
        }
    }

    #[test]
    fn test_slash_split_conserves_stake() {
        for pct in [0u32, 50, 100] {
            let store = funded_store("0.03");
            let t = task("0.03");
            let now = Timestamp::new(1);
            store
                .write(|txn| lock_stake(txn, &t, &worker(), None, now))
                .unwrap();
            let rate = Percent::new(pct).unwrap().to_bps();
            let outcome = store
                .write(|txn| slash_stake(txn, &t, &worker(), None, rate, now))
                .unwrap();
            let StakeOutcome::Slashed {
                locked,
                slashed,
                returned,
                ..
            } = outcome
            else {
                panic!("expected a slash");
            };
            assert_eq!(slashed.checked_add(returned).unwrap(), locked);

            let (available, locked_now) = balances(&store);
            assert_eq!(available, returned.to_string());
            assert_eq!(locked_now, "0");
            assert_eq!(protocol(&store), slashed.to_string());
        }
    }

    #[test]
    fn test_resolved_stake_cannot_be_slashed() {
        let store = funded_store("1");
        let t = task("0.5");
        let now = Timestamp::new(1);
        store
            .write(|txn| lock_stake(txn, &t, &worker(), None, now))
            .unwrap();
        store
            .write(|txn| unlock_stake(txn, &t, &worker(), None, now))
            .unwrap();
        let err = store
            .write(|txn| slash_stake(txn, &t, &worker(), None, BasisPoints::FULL, now))
            .unwrap_err();
        assert_eq!(err.code(), "no_active_stake");
        assert_eq!(protocol(&store), "0");
    }
}
