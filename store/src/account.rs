//! Ledger account records.

use bounty_types::{Amount, AmountError, Chain, Owner, Timestamp, WorkerId};
use serde::{Deserialize, Serialize};

/// Identifies one balance pair: (owner_type, owner_id, chain).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub owner: Owner,
    pub chain: Chain,
}

impl AccountKey {
    pub fn new(owner: Owner, chain: Chain) -> Self {
        Self { owner, chain }
    }

    pub fn worker(id: &WorkerId, chain: Chain) -> Self {
        Self::new(Owner::Worker(id.clone()), chain)
    }

    pub fn protocol(chain: Chain) -> Self {
        Self::new(Owner::Protocol, chain)
    }

    /// Stable string key for ordered backends, e.g. `ETH/worker/alice`.
    pub fn storage_key(&self) -> String {
        match &self.owner {
            Owner::Worker(id) => format!("{}/worker/{id}", self.chain),
            Owner::Protocol => format!("{}/protocol", self.chain),
        }
    }
}

/// Available and locked balances for one owner on one chain.
///
/// Both fields are written back together on every mutation; neither may go
/// negative, which [`Amount`] enforces by construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub key: AccountKey,
    pub available: Amount,
    pub locked: Amount,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LedgerAccount {
    pub fn new(key: AccountKey, now: Timestamp) -> Self {
        Self {
            key,
            available: Amount::ZERO,
            locked: Amount::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Result<Amount, AmountError> {
        self.available.checked_add(self.locked)
    }
}
