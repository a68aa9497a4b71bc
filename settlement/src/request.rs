//! Settlement request and result shapes.

use bounty_store::LedgerAccount;
use bounty_types::{
    Amount, BasisPoints, Chain, MilestoneId, SettlementId, SubmissionId, TaskId, WorkerId,
};
use serde::{Deserialize, Serialize};

/// Which of the payer's balances funds the gross amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingSource {
    #[default]
    Available,
    /// The task reward already locked in the payer's escrow.
    Escrow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettlementRequest {
    pub task_id: TaskId,
    pub submission_id: SubmissionId,
    #[serde(default)]
    pub milestone_id: Option<MilestoneId>,
    pub payer_id: WorkerId,
    pub worker_id: WorkerId,
    pub gross_amount: Amount,
    pub chain: Chain,
    /// Overrides the engine's default fee.
    #[serde(default, rename = "protocol_fee_rate_bps", alias = "fee_rate_bps")]
    pub fee_rate_bps: Option<BasisPoints>,
    #[serde(default)]
    pub funding: FundingSource,
}

impl SettlementRequest {
    pub fn settlement_id(&self) -> SettlementId {
        SettlementId::derive(
            &self.task_id,
            self.milestone_id.as_ref(),
            &self.submission_id,
        )
    }
}

/// Account states right after a settlement committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBalances {
    pub payer: LedgerAccount,
    pub worker: LedgerAccount,
    pub protocol: LedgerAccount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub settlement_id: SettlementId,
    /// `true` when the settlement had already been applied and nothing moved.
    pub idempotent: bool,
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
    pub fee_rate: BasisPoints,
    /// Present only for the call that actually moved funds.
    pub balances: Option<SettlementBalances>,
}
