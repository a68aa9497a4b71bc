use bounty_escrow::EscrowError;
use bounty_ledger::LedgerError;
use bounty_settlement::SettlementError;
use bounty_store::{MilestoneStatus, StoreError, SubmissionStatus, TaskStatus};
use bounty_types::{AmountError, MilestoneId, RateError, SubmissionId, TaskId, WorkerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} already exists")]
    TaskExists(TaskId),

    #[error("submission {0} not found")]
    SubmissionNotFound(SubmissionId),

    #[error("submission {0} already exists")]
    SubmissionExists(SubmissionId),

    #[error("milestone {0} not found")]
    MilestoneNotFound(MilestoneId),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid percentage: {0}")]
    InvalidPercentage(String),

    #[error("task {task} is {}, not open", .status.as_str())]
    TaskNotOpen { task: TaskId, status: TaskStatus },

    #[error("task {task} is {}, not claimed", .status.as_str())]
    TaskNotClaimed { task: TaskId, status: TaskStatus },

    #[error("task {task} is {}, not pending review", .status.as_str())]
    TaskNotPendingReview { task: TaskId, status: TaskStatus },

    #[error("task {task} is {}, not disputed", .status.as_str())]
    TaskNotDisputed { task: TaskId, status: TaskStatus },

    #[error("task {task} has passed its deadline")]
    DeadlinePassed { task: TaskId },

    #[error("task {task} has not reached its deadline")]
    DeadlineNotReached { task: TaskId },

    #[error("worker {worker} does not hold the claim on task {task}")]
    NotClaimant { task: TaskId, worker: WorkerId },

    #[error("worker {worker} did not create task {task}")]
    NotCreator { task: TaskId, worker: WorkerId },

    #[error("creator cannot claim their own task {task}")]
    SelfClaim { task: TaskId },

    #[error("worker {worker} lacks capabilities {missing:?}")]
    MissingCapabilities {
        worker: WorkerId,
        missing: Vec<String>,
    },

    #[error("claim on task {task} by {worker} expired; stake was slashed")]
    ClaimExpired { task: TaskId, worker: WorkerId },

    #[error("task {0} has milestones; submit against a milestone")]
    MilestoneTask(TaskId),

    #[error("task {0} has no milestones")]
    NotMilestoneTask(TaskId),

    #[error("milestone {milestone} is {status:?}, not active")]
    MilestoneNotActive {
        milestone: MilestoneId,
        status: MilestoneStatus,
    },

    #[error("worker {worker} used all {max} attempts on milestone {milestone}")]
    MaxAttemptsReached {
        milestone: MilestoneId,
        worker: WorkerId,
        max: u32,
    },

    #[error("submission {submission} is {status:?}")]
    SubmissionNotPending {
        submission: SubmissionId,
        status: SubmissionStatus,
    },

    #[error("submission {submission} is {status:?}, not rejected")]
    SubmissionNotRejected {
        submission: SubmissionId,
        status: SubmissionStatus,
    },

    #[error("submission {submission} is {status:?}, not disputed")]
    SubmissionNotDisputed {
        submission: SubmissionId,
        status: SubmissionStatus,
    },

    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MarketError {
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::TaskNotFound(_) => "task_not_found",
            MarketError::TaskExists(_) => "task_exists",
            MarketError::SubmissionNotFound(_) => "submission_not_found",
            MarketError::SubmissionExists(_) => "submission_exists",
            MarketError::MilestoneNotFound(_) => "milestone_not_found",
            MarketError::InvalidTask(_) => "invalid_task",
            MarketError::InvalidAmount(_) => "invalid_amount",
            MarketError::InvalidPercentage(_) => "invalid_percentage",
            MarketError::TaskNotOpen { .. } => "task_not_open",
            MarketError::TaskNotClaimed { .. } => "task_not_claimed",
            MarketError::TaskNotPendingReview { .. } => "task_not_pending_review",
            MarketError::TaskNotDisputed { .. } => "task_not_disputed",
            MarketError::DeadlinePassed { .. } => "deadline_passed",
            MarketError::DeadlineNotReached { .. } => "deadline_not_reached",
            MarketError::NotClaimant { .. } => "not_claimant",
            MarketError::NotCreator { .. } => "not_creator",
            MarketError::SelfClaim { .. } => "self_claim",
            MarketError::MissingCapabilities { .. } => "missing_capabilities",
            MarketError::ClaimExpired { .. } => "claim_expired",
            MarketError::MilestoneTask(_) => "milestone_task",
            MarketError::NotMilestoneTask(_) => "not_milestone_task",
            MarketError::MilestoneNotActive { .. } => "milestone_not_active",
            MarketError::MaxAttemptsReached { .. } => "max_attempts_reached",
            MarketError::SubmissionNotPending { .. } => "submission_not_pending",
            MarketError::SubmissionNotRejected { .. } => "submission_not_rejected",
            MarketError::SubmissionNotDisputed { .. } => "submission_not_disputed",
            MarketError::Escrow(e) => e.code(),
            MarketError::Settlement(e) => e.code(),
            MarketError::Ledger(e) => e.code(),
            MarketError::Storage(_) => "storage_error",
        }
    }
}

impl From<AmountError> for MarketError {
    fn from(e: AmountError) -> Self {
        MarketError::InvalidAmount(e.to_string())
    }
}

impl From<RateError> for MarketError {
    fn from(e: RateError) -> Self {
        MarketError::InvalidPercentage(e.to_string())
    }
}
