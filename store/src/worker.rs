//! Worker records mirrored from the registration layer.

use std::collections::{BTreeMap, BTreeSet};

use bounty_types::{Amount, Chain, Timestamp, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub capabilities: BTreeSet<String>,
    pub tasks_completed: u64,
    pub claims_expired: u64,
    pub submissions_rejected: u64,
    /// Lifetime net payouts per chain.
    pub total_earned: BTreeMap<Chain, Amount>,
    /// Reputation in basis points (0..=10000).
    pub reputation_bps: u32,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkerRecord {
    pub fn new(
        id: WorkerId,
        capabilities: BTreeSet<String>,
        reputation_bps: u32,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            capabilities,
            tasks_completed: 0,
            claims_expired: 0,
            submissions_rejected: 0,
            total_earned: BTreeMap::new(),
            reputation_bps,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn earned_on(&self, chain: Chain) -> Amount {
        self.total_earned.get(&chain).copied().unwrap_or(Amount::ZERO)
    }

    /// Capabilities from `required` this worker lacks.
    pub fn missing_capabilities<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|cap| !self.capabilities.contains(cap.as_str()))
            .map(String::as_str)
            .collect()
    }
}
