//! Read-only adapter for clients of the old per-worker balance fields.
//!
//! The view is derived from the canonical ledger on every call and is never
//! written back.

use serde::{Deserialize, Serialize};

use bounty_ledger::accounts;
use bounty_store::{AccountKey, LedgerRead};
use bounty_types::{Amount, Chain, Timestamp, WorkerId};

use crate::NodeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyBalance {
    pub balance: Amount,
    pub staked: Amount,
    pub total_earned: Amount,
}

pub fn legacy_balance<R: LedgerRead + ?Sized>(
    reader: &R,
    worker: &WorkerId,
    chain: Chain,
    now: Timestamp,
) -> Result<LegacyBalance, NodeError> {
    let account = accounts::snapshot(reader, &AccountKey::worker(worker, chain), now)?;
    let total_earned = reader
        .worker(worker)?
        .map(|record| record.earned_on(chain))
        .unwrap_or(Amount::ZERO);
    Ok(LegacyBalance {
        balance: account.available,
        staked: account.locked,
        total_earned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_nullables::NullStore;
    use bounty_store::LedgerStore;

    #[test]
    fn unknown_worker_reads_as_zero() {
        let store = NullStore::new();
        let worker = WorkerId::new("ghost").unwrap();
        let view = store
            .read(|r| legacy_balance(r, &worker, Chain::Usd, Timestamp::new(1)))
            .unwrap();
        assert_eq!(
            view,
            LegacyBalance {
                balance: Amount::ZERO,
                staked: Amount::ZERO,
                total_earned: Amount::ZERO,
            }
        );
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({"balance": "0", "staked": "0", "total_earned": "0"})
        );
    }
}
