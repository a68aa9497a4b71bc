//! Task, milestone, submission and stake records.

use std::collections::BTreeMap;

use bounty_types::{
    Amount, BasisPoints, Chain, MilestoneId, Percent, SubmissionId, TaskId, Timestamp, WorkerId,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Claimed,
    PendingReview,
    Completed,
    Expired,
    Cancelled,
    Disputed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Claimed => "claimed",
            TaskStatus::PendingReview => "pending_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Expired => "expired",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Disputed => "disputed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Expired | TaskStatus::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    None,
    Locked,
    Refunded,
    Paid,
}

/// How much stake a claimant must lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeRequirement {
    Flat(Amount),
    /// Sum of every milestone's stake, locked once at claim time.
    Milestones { total: Amount },
}

impl StakeRequirement {
    pub fn amount(&self) -> Amount {
        match self {
            StakeRequirement::Flat(amount) => *amount,
            StakeRequirement::Milestones { total } => *total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub creator: WorkerId,
    pub title: String,
    pub chain: Chain,
    /// Full reward, locked in escrow at creation.
    pub reward: Amount,
    pub escrow_status: EscrowStatus,
    /// Escrow already consumed by settlements (milestone payouts draw in parts).
    pub escrow_spent: Amount,
    pub stake: StakeRequirement,
    pub slash_percentage: Percent,
    pub protocol_fee_bps: Option<BasisPoints>,
    pub claim_timeout_minutes: u32,
    pub deadline: Option<Timestamp>,
    pub required_capabilities: Vec<String>,
    pub milestone_count: u32,
    pub status: TaskStatus,
    pub claimed_by: Option<WorkerId>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TaskRecord {
    pub fn has_milestones(&self) -> bool {
        self.milestone_count > 0
    }

    pub fn required_stake(&self) -> Amount {
        self.stake.amount()
    }

    /// Moment the current claim stops being usable.
    pub fn claim_expires_at(&self) -> Option<Timestamp> {
        self.claimed_at
            .map(|at| at.plus_minutes(self.claim_timeout_minutes))
    }

    /// A submission at exactly `claimed_at + timeout` is still on time.
    pub fn is_claim_expired(&self, now: Timestamp) -> bool {
        self.claim_expires_at().is_some_and(|deadline| now > deadline)
    }

    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    pub fn is_claimed_by(&self, worker: &WorkerId) -> bool {
        self.claimed_by.as_ref() == Some(worker)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Active,
    Submitted,
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub id: MilestoneId,
    pub task_id: TaskId,
    pub order_index: u32,
    pub title: String,
    /// Share of the task reward paid when this milestone is accepted.
    pub reward: Amount,
    pub stake: Amount,
    pub status: MilestoneStatus,
    pub worker_attempts: BTreeMap<WorkerId, u32>,
    pub max_attempts_per_worker: u32,
}

impl MilestoneRecord {
    pub fn attempts_used(&self, worker: &WorkerId) -> u32 {
        self.worker_attempts.get(worker).copied().unwrap_or(0)
    }

    pub fn has_attempts_left(&self, worker: &WorkerId) -> bool {
        self.attempts_used(worker) < self.max_attempts_per_worker
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Accepted,
    Rejected,
    Disputed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub task_id: TaskId,
    pub milestone_id: Option<MilestoneId>,
    pub worker: WorkerId,
    /// Opaque result payload (URI, hash, inline text).
    pub payload: String,
    pub status: SubmissionStatus,
    pub submitted_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeStatus {
    Locked,
    Released,
    Slashed,
}

/// Tracks the one stake a worker holds against a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub task_id: TaskId,
    pub worker: WorkerId,
    pub chain: Chain,
    pub amount: Amount,
    pub status: StakeStatus,
    pub locked_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl StakeRecord {
    pub fn is_locked(&self) -> bool {
        self.status == StakeStatus::Locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(claimed_at: Option<u64>, timeout: u32) -> TaskRecord {
        TaskRecord {
            id: TaskId::new("T1").unwrap(),
            creator: WorkerId::new("creator").unwrap(),
            title: "t".into(),
            chain: Chain::Eth,
            reward: Amount::from_units(1),
            escrow_status: EscrowStatus::Locked,
            escrow_spent: Amount::ZERO,
            stake: StakeRequirement::Flat(Amount::ZERO),
            slash_percentage: Percent::new(50).unwrap(),
            protocol_fee_bps: None,
            claim_timeout_minutes: timeout,
            deadline: Some(Timestamp::new(10_000)),
            required_capabilities: Vec::new(),
            milestone_count: 0,
            status: TaskStatus::Claimed,
            claimed_by: Some(WorkerId::new("w").unwrap()),
            claimed_at: claimed_at.map(Timestamp::new),
            created_at: Timestamp::new(0),
            updated_at: Timestamp::new(0),
        }
    }

    #[test]
    fn claim_expiry_boundary_is_inclusive() {
        let t = task(Some(1_000), 10);
        assert!(!t.is_claim_expired(Timestamp::new(1_600)));
        assert!(t.is_claim_expired(Timestamp::new(1_601)));
        assert!(!task(None, 10).is_claim_expired(Timestamp::new(u64::MAX)));
    }

    #[test]
    fn deadline_check() {
        let t = task(None, 10);
        assert!(!t.is_past_deadline(Timestamp::new(10_000)));
        assert!(t.is_past_deadline(Timestamp::new(10_001)));
    }
}
