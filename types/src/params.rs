//! Protocol parameters applied when a task or request leaves a value unset.

use serde::{Deserialize, Serialize};

use crate::rate::BasisPoints;

/// Fee applied when neither the request nor the task sets one (2.5%).
pub const DEFAULT_FEE_BPS: BasisPoints = BasisPoints::from_const(250);

/// Reputation of a worker with no finished claims (basis points).
pub const NEUTRAL_REPUTATION_BPS: u32 = 5_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Protocol fee taken from every settlement without an explicit rate.
    pub default_fee_bps: BasisPoints,

    /// Claim window for tasks that do not set one.
    pub default_claim_timeout_minutes: u32,

    /// Submissions a single worker may make against one milestone.
    pub default_max_attempts_per_worker: u32,

    /// Reputation assigned to workers without any finished claims (basis points).
    pub neutral_reputation_bps: u32,

    /// Upper bound on `list_ledger_entries` page size.
    pub max_entry_page: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            default_fee_bps: DEFAULT_FEE_BPS,
            default_claim_timeout_minutes: 60,
            default_max_attempts_per_worker: 3,
            neutral_reputation_bps: NEUTRAL_REPUTATION_BPS,
            max_entry_page: 500,
        }
    }
}
