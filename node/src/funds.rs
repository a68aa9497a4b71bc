//! Deposits and withdrawals: the only ways money enters or leaves the ledger.
//!
//! Both are keyed in the idempotency index, so a provider callback or a
//! client retry delivered twice moves money once. A replay with different
//! terms than the original is refused rather than silently absorbed.

use bounty_ledger::{accounts, journal, LedgerError};
use bounty_store::{
    AccountKey, AuditEvent, EntryMeta, LedgerAccount, LedgerEntry, LedgerTxn, NewEntry,
    WithdrawalMeta,
};
use bounty_types::{Amount, Chain, EntryId, Owner, Timestamp, WithdrawalId, WorkerId};

use crate::NodeError;

pub fn deposit_key(chain: Chain, reference: &str) -> String {
    format!("deposit_{chain}_{reference}")
}

pub fn withdrawal_key(id: &WithdrawalId) -> String {
    format!("withdrawal_{id}")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    Credited {
        entry: EntryId,
        account: LedgerAccount,
    },
    AlreadyCredited {
        entry: EntryId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    Requested {
        entry: EntryId,
        account: LedgerAccount,
    },
    AlreadyRequested {
        entry: EntryId,
    },
}

/// Whether a previously keyed entry describes the same movement.
fn same_movement(entry: &LedgerEntry, owner: &WorkerId, chain: Chain, amount: Amount) -> bool {
    let party = entry.to.as_ref().or(entry.from.as_ref());
    entry.chain == chain
        && entry.amount == amount
        && matches!(party, Some(Owner::Worker(id)) if id == owner)
}

fn require_positive(amount: Amount, what: &str) -> Result<(), NodeError> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount(format!("{what} must be positive")).into());
    }
    Ok(())
}

/// Credit a confirmed on-chain deposit to the worker's available balance.
pub fn confirm_deposit(
    txn: &mut dyn LedgerTxn,
    worker: &WorkerId,
    chain: Chain,
    amount: Amount,
    reference: &str,
    now: Timestamp,
) -> Result<DepositOutcome, NodeError> {
    require_positive(amount, "deposit amount")?;
    if reference.trim().is_empty() {
        return Err(NodeError::InvalidRequest(
            "deposit reference must not be empty".into(),
        ));
    }

    let key = deposit_key(chain, reference);
    if let Some(existing) = journal::lookup_key(txn, &key)? {
        if !same_movement(&existing, worker, chain, amount) {
            return Err(LedgerError::Duplicate(key).into());
        }
        tracing::debug!(reference, chain = %chain, "deposit already credited");
        return Ok(DepositOutcome::AlreadyCredited { entry: existing.id });
    }

    let account =
        accounts::credit_available(txn, &AccountKey::worker(worker, chain), amount, now)?;
    let entry = journal::record_keyed(
        txn,
        &key,
        NewEntry::deposit(worker, chain, amount, reference, now),
        AuditEvent::DepositCredited {
            worker: worker.clone(),
            chain,
            amount,
            reference: reference.to_string(),
        },
    )?;

    tracing::info!(
        worker = %worker,
        chain = %chain,
        amount = %amount,
        reference,
        "deposit credited"
    );
    Ok(DepositOutcome::Credited { entry, account })
}

/// Debit a withdrawal and queue it for the chain provider.
///
/// The provider receives it from the outbox after commit.
pub fn request_withdrawal(
    txn: &mut dyn LedgerTxn,
    withdrawal_id: &WithdrawalId,
    worker: &WorkerId,
    chain: Chain,
    amount: Amount,
    destination: &str,
    now: Timestamp,
) -> Result<WithdrawalOutcome, NodeError> {
    require_positive(amount, "withdrawal amount")?;
    if destination.trim().is_empty() {
        return Err(NodeError::InvalidRequest(
            "withdrawal destination must not be empty".into(),
        ));
    }

    let key = withdrawal_key(withdrawal_id);
    if let Some(existing) = journal::lookup_key(txn, &key)? {
        let same_destination = matches!(
            &existing.meta,
            EntryMeta::Withdrawal(meta) if meta.destination == destination
        );
        if !same_destination || !same_movement(&existing, worker, chain, amount) {
            return Err(LedgerError::Duplicate(key).into());
        }
        tracing::debug!(withdrawal = %withdrawal_id, "withdrawal already requested");
        return Ok(WithdrawalOutcome::AlreadyRequested { entry: existing.id });
    }

    let account =
        accounts::debit_available(txn, &AccountKey::worker(worker, chain), amount, now)?;
    let meta = WithdrawalMeta {
        withdrawal_id: withdrawal_id.clone(),
        destination: destination.to_string(),
    };
    let entry = journal::record_keyed(
        txn,
        &key,
        NewEntry::withdrawal(worker, chain, amount, meta, now),
        AuditEvent::WithdrawalRequested {
            withdrawal_id: withdrawal_id.clone(),
            worker: worker.clone(),
            chain,
            amount,
            destination: destination.to_string(),
        },
    )?;

    tracing::info!(
        withdrawal = %withdrawal_id,
        worker = %worker,
        chain = %chain,
        amount = %amount,
        "withdrawal requested"
    );
    Ok(WithdrawalOutcome::Requested { entry, account })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_nullables::NullStore;
    use bounty_store::{LedgerRead, LedgerStore};

    fn worker() -> WorkerId {
        WorkerId::new("w1").unwrap()
    }

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn deposit_replay_credits_once() {
        let store = NullStore::new();
        let now = Timestamp::new(5);
        let first = store
            .write(|txn| confirm_deposit(txn, &worker(), Chain::Eth, amt("1.5"), "0xabc", now))
            .unwrap();
        let DepositOutcome::Credited { entry, account } = first else {
            panic!("first delivery must credit");
        };
        assert_eq!(account.available, amt("1.5"));

        let second = store
            .write(|txn| confirm_deposit(txn, &worker(), Chain::Eth, amt("1.5"), "0xabc", now))
            .unwrap();
        assert_eq!(second, DepositOutcome::AlreadyCredited { entry });

        let conflicting = store
            .write(|txn| confirm_deposit(txn, &worker(), Chain::Eth, amt("2"), "0xabc", now))
            .unwrap_err();
        assert_eq!(conflicting.code(), "duplicate");

        let balance = store
            .read(|r| r.account(&AccountKey::worker(&worker(), Chain::Eth)))
            .unwrap()
            .unwrap();
        assert_eq!(balance.available, amt("1.5"));
    }

    #[test]
    fn withdrawal_needs_funds_and_is_keyed() {
        let store = NullStore::new();
        let now = Timestamp::new(5);
        let id = WithdrawalId::new("wd-1").unwrap();

        let broke = store
            .write(|txn| {
                request_withdrawal(txn, &id, &worker(), Chain::Btc, amt("1"), "bc1q", now)
            })
            .unwrap_err();
        assert_eq!(broke.code(), "insufficient_balance");

        store
            .write(|txn| confirm_deposit(txn, &worker(), Chain::Btc, amt("3"), "tx1", now))
            .unwrap();
        let first = store
            .write(|txn| {
                request_withdrawal(txn, &id, &worker(), Chain::Btc, amt("1"), "bc1q", now)
            })
            .unwrap();
        assert!(matches!(first, WithdrawalOutcome::Requested { ref account, .. }
            if account.available == amt("2")));

        let again = store
            .write(|txn| {
                request_withdrawal(txn, &id, &worker(), Chain::Btc, amt("1"), "bc1q", now)
            })
            .unwrap();
        assert!(matches!(again, WithdrawalOutcome::AlreadyRequested { .. }));

        let redirected = store
            .write(|txn| {
                request_withdrawal(txn, &id, &worker(), Chain::Btc, amt("1"), "bc1other", now)
            })
            .unwrap_err();
        assert_eq!(redirected.code(), "duplicate");
    }

    #[test]
    fn empty_reference_is_rejected() {
        let store = NullStore::new();
        let err = store
            .write(|txn| {
                confirm_deposit(txn, &worker(), Chain::Eth, amt("1"), " ", Timestamp::new(1))
            })
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }
}
