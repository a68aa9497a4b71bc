//! Task creation input.
//!
//! Rates arrive as raw integers and are validated into [`Percent`] and
//! [`BasisPoints`] when the task is created.
//!
//! [`Percent`]: bounty_types::Percent
//! [`BasisPoints`]: bounty_types::BasisPoints

use bounty_types::{Amount, Chain, MilestoneId, TaskId, Timestamp, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMilestone {
    pub id: MilestoneId,
    pub title: String,
    /// Share of the task reward paid when this milestone is accepted.
    pub reward: Amount,
    #[serde(default)]
    pub stake: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub id: TaskId,
    pub creator: WorkerId,
    pub title: String,
    pub chain: Chain,
    pub reward: Amount,
    /// Flat stake; ignored when milestones are given.
    #[serde(default)]
    pub stake: Amount,
    /// Percentage of the stake slashed on failure (0..=100).
    #[serde(default)]
    pub slash_percentage: u32,
    /// Protocol fee override in basis points.
    #[serde(default)]
    pub protocol_fee_bps: Option<u32>,
    #[serde(default)]
    pub claim_timeout_minutes: Option<u32>,
    #[serde(default)]
    pub deadline: Option<Timestamp>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<NewMilestone>,
    #[serde(default)]
    pub max_attempts_per_worker: Option<u32>,
}
