//! What each state-machine command did.

use bounty_escrow::{RefundOutcome, StakeOutcome};
use bounty_settlement::SettlementResult;
use bounty_store::{SubmissionRecord, TaskRecord, TaskStatus};
use bounty_types::{Amount, MilestoneId, TaskId, WorkerId};
use serde::{Deserialize, Serialize};

/// A claim that timed out and was slashed when the task was next touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredClaim {
    pub task_id: TaskId,
    pub worker: WorkerId,
    pub stake: StakeOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub task: TaskRecord,
    pub stake: StakeOutcome,
    pub active_milestone: Option<MilestoneId>,
    /// A previous claim expired lazily before this one was granted.
    pub expired_previous: Option<ExpiredClaim>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { stake: StakeOutcome },
    /// The claim had already timed out; the slash is committed.
    ClaimExpired(ExpiredClaim),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(SubmissionRecord),
    /// The submission arrived after the claim window; the slash is committed.
    ClaimExpired(ExpiredClaim),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub settlement: SettlementResult,
    pub task_status: TaskStatus,
    pub next_milestone: Option<MilestoneId>,
    /// Escrow returned to the creator when the task completed.
    pub escrow_released: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectOutcome {
    /// The claimant may submit again.
    Resubmit { attempts_left: Option<u32> },
    /// Milestone attempts are used up: stake slashed, task reopened.
    AttemptsExhausted { stake: StakeOutcome },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    WorkerWins,
    CreatorWins,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    Accepted(AcceptOutcome),
    Slashed { stake: StakeOutcome },
}

/// Cancellation result: refunded now, or already refunded earlier.
pub type CancelOutcome = RefundOutcome;
