//! Ledger account operations.
//!
//! Accounts are created on first reference and never deleted. Protocol
//! accounts are the exception: they must exist before any fee or slash is
//! credited to them, and [`bootstrap`] creates one per configured chain.

use bounty_store::{AccountKey, LedgerAccount, LedgerRead, LedgerTxn};
use bounty_types::{Amount, Chain, Timestamp};

use crate::LedgerError;

/// Current state of an account, creating it with zero balances if absent.
pub fn get_or_create(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    if let Some(account) = txn.account(key)? {
        return Ok(account);
    }
    let account = LedgerAccount::new(key.clone(), now);
    txn.put_account(&account)?;
    tracing::debug!(account = %key.storage_key(), "created ledger account");
    Ok(account)
}

/// Read-only view: an absent account reads as zero balances.
pub fn snapshot<R: LedgerRead + ?Sized>(
    reader: &R,
    key: &AccountKey,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    Ok(reader
        .account(key)?
        .unwrap_or_else(|| LedgerAccount::new(key.clone(), now)))
}

/// Create the protocol account for each chain that lacks one.
pub fn bootstrap(
    txn: &mut dyn LedgerTxn,
    chains: &[Chain],
    now: Timestamp,
) -> Result<(), LedgerError> {
    for chain in chains {
        get_or_create(txn, &AccountKey::protocol(*chain), now)?;
    }
    Ok(())
}

fn mutate<F>(
    txn: &mut dyn LedgerTxn,
    mut account: LedgerAccount,
    now: Timestamp,
    apply: F,
) -> Result<LedgerAccount, LedgerError>
where
    F: FnOnce(&mut LedgerAccount) -> Result<(), LedgerError>,
{
    apply(&mut account)?;
    account.updated_at = now;
    txn.put_account(&account)?;
    Ok(account)
}

fn take(from: Amount, amount: Amount) -> Result<Amount, LedgerError> {
    from.checked_sub(amount)
        .map_err(|_| LedgerError::InsufficientBalance {
            needed: amount,
            available: from,
        })
}

pub fn credit_available(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let account = get_or_create(txn, key, now)?;
    mutate(txn, account, now, |a| {
        a.available = a.available.checked_add(amount)?;
        Ok(())
    })
}

pub fn debit_available(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let account = get_or_create(txn, key, now)?;
    mutate(txn, account, now, |a| {
        a.available = take(a.available, amount)?;
        Ok(())
    })
}

pub fn move_available_to_locked(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let account = get_or_create(txn, key, now)?;
    mutate(txn, account, now, |a| {
        a.available = take(a.available, amount)?;
        a.locked = a.locked.checked_add(amount)?;
        Ok(())
    })
}

pub fn move_locked_to_available(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let account = get_or_create(txn, key, now)?;
    mutate(txn, account, now, |a| {
        a.locked = take(a.locked, amount)?;
        a.available = a.available.checked_add(amount)?;
        Ok(())
    })
}

/// Consume locked funds (escrow-funded settlement, slashing).
pub fn debit_locked(
    txn: &mut dyn LedgerTxn,
    key: &AccountKey,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let account = get_or_create(txn, key, now)?;
    mutate(txn, account, now, |a| {
        a.locked = take(a.locked, amount)?;
        Ok(())
    })
}

/// Credit the protocol account for `chain`, which must already exist.
pub fn credit_protocol(
    txn: &mut dyn LedgerTxn,
    chain: Chain,
    amount: Amount,
    now: Timestamp,
) -> Result<LedgerAccount, LedgerError> {
    let key = AccountKey::protocol(chain);
    let account = txn
        .account(&key)?
        .ok_or_else(|| LedgerError::AccountNotFound(key.storage_key()))?;
    mutate(txn, account, now, |a| {
        a.available = a.available.checked_add(amount)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_nullables::NullStore;
    use bounty_store::LedgerStore;
    use bounty_types::WorkerId;

    fn alice() -> AccountKey {
        AccountKey::worker(&WorkerId::new("alice").unwrap(), Chain::Eth)
    }

    fn eth(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn lock_then_unlock_restores_balances() {
        let store = NullStore::new();
        let now = Timestamp::new(10);
        store
            .write(|txn| credit_available(txn, &alice(), eth("0.05"), now))
            .unwrap();

        let locked = store
            .write(|txn| move_available_to_locked(txn, &alice(), eth("0.05"), now))
            .unwrap();
        assert_eq!(locked.available.to_string(), "0");
        assert_eq!(locked.locked.to_string(), "0.05");

        let restored = store
            .write(|txn| move_locked_to_available(txn, &alice(), eth("0.05"), now))
            .unwrap();
        assert_eq!(restored.available.to_string(), "0.05");
        assert_eq!(restored.locked, Amount::ZERO);
    }

    #[test]
    fn debit_below_zero_is_rejected_without_clamping() {
        let store = NullStore::new();
        let now = Timestamp::new(1);
        store
            .write(|txn| credit_available(txn, &alice(), eth("1"), now))
            .unwrap();

        let err = store
            .write(|txn| debit_available(txn, &alice(), eth("1.5"), now))
            .unwrap_err();
        match &err {
            LedgerError::InsufficientBalance { needed, available } => {
                assert_eq!(needed.to_string(), "1.5");
                assert_eq!(available.to_string(), "1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.code(), "insufficient_balance");

        let account = store.read(|r| snapshot(r, &alice(), now)).unwrap();
        assert_eq!(account.available, eth("1"));
    }

    #[test]
    fn debit_locked_requires_locked_funds() {
        let store = NullStore::new();
        let now = Timestamp::new(1);
        let err = store
            .write(|txn| debit_locked(txn, &alice(), eth("0.01"), now))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn protocol_credit_needs_bootstrap() {
        let store = NullStore::new();
        let now = Timestamp::new(1);
        let err = store
            .write(|txn| credit_protocol(txn, Chain::Btc, eth("0.02"), now))
            .unwrap_err();
        assert_eq!(err.code(), "account_not_found");

        store
            .write(|txn| bootstrap(txn, &Chain::ALL, now))
            .unwrap();
        let protocol = store
            .write(|txn| credit_protocol(txn, Chain::Btc, eth("0.02"), now))
            .unwrap();
        assert_eq!(protocol.available.to_string(), "0.02");
    }

    #[test]
    fn snapshot_does_not_create_accounts() {
        let store = NullStore::new();
        let account = store
            .read(|r| snapshot(r, &alice(), Timestamp::new(1)))
            .unwrap();
        assert_eq!(account.available, Amount::ZERO);
        assert!(store.read(|r| r.account(&alice())).unwrap().is_none());
    }
}
