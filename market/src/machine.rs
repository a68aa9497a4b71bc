//! The task state machine.

use std::collections::{BTreeMap, BTreeSet};

use bounty_escrow::{self as escrow, RefundOutcome};
use bounty_settlement::{FundingSource, SettlementEngine, SettlementRequest};
use bounty_store::{
    AuditEvent, EscrowStatus, LedgerTxn, MilestoneRecord, MilestoneStatus, StakeRequirement,
    SubmissionRecord, SubmissionStatus, TaskRecord, TaskStatus,
};
use bounty_types::{
    Amount, BasisPoints, MilestoneId, Percent, ProtocolParams, SubmissionId, TaskId, Timestamp,
    WorkerId,
};

use crate::outcome::CancelOutcome;
use crate::{
    milestones, reputation, workers, AcceptOutcome, ClaimOutcome, DisputeResolution,
    ExpiredClaim, MarketError, NewTask, RejectOutcome, ReleaseOutcome, ResolveOutcome,
    SubmitOutcome,
};

/// Drives task transitions and the money movements they trigger.
///
/// Every method runs inside the caller's write transaction; an `Err`
/// return means the caller must roll the transaction back.
#[derive(Clone, Debug)]
pub struct TaskMarket {
    params: ProtocolParams,
    settlement: SettlementEngine,
}

impl Default for TaskMarket {
    fn default() -> Self {
        Self::new(ProtocolParams::default())
    }
}

pub(crate) fn load_task(txn: &dyn LedgerTxn, id: &TaskId) -> Result<TaskRecord, MarketError> {
    txn.task(id)?
        .ok_or_else(|| MarketError::TaskNotFound(id.clone()))
}

fn load_submission(
    txn: &dyn LedgerTxn,
    id: &SubmissionId,
) -> Result<SubmissionRecord, MarketError> {
    txn.submission(id)?
        .ok_or_else(|| MarketError::SubmissionNotFound(id.clone()))
}

/// Store the task and announce a status change if there was one.
fn save_task(
    txn: &mut dyn LedgerTxn,
    task: &mut TaskRecord,
    previous: TaskStatus,
    now: Timestamp,
) -> Result<(), MarketError> {
    task.updated_at = now;
    txn.put_task(task)?;
    if previous != task.status {
        txn.push_outbox(
            AuditEvent::TaskStatusChanged {
                task_id: task.id.clone(),
                from: Some(previous),
                to: task.status,
            },
            now,
        )?;
        tracing::info!(
            task = %task.id,
            from = previous.as_str(),
            to = task.status.as_str(),
            "task status changed"
        );
    }
    Ok(())
}

/// Drop the claim and put the task back on the market.
fn reopen(txn: &mut dyn LedgerTxn, task: &mut TaskRecord) -> Result<(), MarketError> {
    task.status = TaskStatus::Open;
    task.claimed_by = None;
    task.claimed_at = None;
    if task.has_milestones() {
        milestones::reset(txn, &task.id)?;
    }
    Ok(())
}

fn require_claimant(task: &TaskRecord, worker: &WorkerId) -> Result<(), MarketError> {
    if task.status != TaskStatus::Claimed {
        return Err(MarketError::TaskNotClaimed {
            task: task.id.clone(),
            status: task.status,
        });
    }
    if !task.is_claimed_by(worker) {
        return Err(MarketError::NotClaimant {
            task: task.id.clone(),
            worker: worker.clone(),
        });
    }
    Ok(())
}

fn require_creator(task: &TaskRecord, caller: &WorkerId) -> Result<(), MarketError> {
    if &task.creator != caller {
        return Err(MarketError::NotCreator {
            task: task.id.clone(),
            worker: caller.clone(),
        });
    }
    Ok(())
}

fn require_pending(submission: &SubmissionRecord) -> Result<(), MarketError> {
    if submission.status != SubmissionStatus::Pending {
        return Err(MarketError::SubmissionNotPending {
            submission: submission.id.clone(),
            status: submission.status,
        });
    }
    Ok(())
}

impl TaskMarket {
    pub fn new(params: ProtocolParams) -> Self {
        let settlement = SettlementEngine::new(params.default_fee_bps);
        Self { params, settlement }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn settlement(&self) -> &SettlementEngine {
        &self.settlement
    }

    /// Validate and store a new open task, locking its reward in escrow.
    pub fn create_task(
        &self,
        txn: &mut dyn LedgerTxn,
        request: NewTask,
        now: Timestamp,
    ) -> Result<TaskRecord, MarketError> {
        if txn.task(&request.id)?.is_some() {
            return Err(MarketError::TaskExists(request.id));
        }
        if request.title.trim().is_empty() {
            return Err(MarketError::InvalidTask("title must not be empty".into()));
        }
        if request.reward.is_zero() {
            return Err(MarketError::InvalidAmount("reward must be positive".into()));
        }
        let slash_percentage = Percent::new(request.slash_percentage)?;
        let protocol_fee_bps = request
            .protocol_fee_bps
            .map(BasisPoints::new)
            .transpose()?;
        let claim_timeout_minutes = request
            .claim_timeout_minutes
            .unwrap_or(self.params.default_claim_timeout_minutes);
        if claim_timeout_minutes == 0 {
            return Err(MarketError::InvalidTask(
                "claim timeout must be at least one minute".into(),
            ));
        }
        if request.deadline.is_some_and(|deadline| deadline <= now) {
            return Err(MarketError::InvalidTask("deadline must be in the future".into()));
        }
        let max_attempts = request
            .max_attempts_per_worker
            .unwrap_or(self.params.default_max_attempts_per_worker);
        if max_attempts == 0 {
            return Err(MarketError::InvalidTask(
                "max attempts per worker must be positive".into(),
            ));
        }

        let stake = if request.milestones.is_empty() {
            StakeRequirement::Flat(request.stake)
        } else {
            let shares = Amount::checked_sum(request.milestones.iter().map(|m| m.reward))?;
            if shares > request.reward {
                return Err(MarketError::InvalidAmount(format!(
                    "milestone rewards {shares} exceed task reward {}",
                    request.reward
                )));
            }
            if request.milestones.iter().any(|m| m.reward.is_zero()) {
                return Err(MarketError::InvalidAmount(
                    "every milestone must carry a reward".into(),
                ));
            }
            let distinct: BTreeSet<&MilestoneId> =
                request.milestones.iter().map(|m| &m.id).collect();
            if distinct.len() != request.milestones.len() {
                return Err(MarketError::InvalidTask("milestone ids must be unique".into()));
            }
            StakeRequirement::Milestones {
                total: Amount::checked_sum(request.milestones.iter().map(|m| m.stake))?,
            }
        };
        let milestone_count = u32::try_from(request.milestones.len())
            .map_err(|_| MarketError::InvalidTask("too many milestones".into()))?;

        let mut task = TaskRecord {
            id: request.id,
            creator: request.creator,
            title: request.title,
            chain: request.chain,
            reward: request.reward,
            escrow_status: EscrowStatus::None,
            escrow_spent: Amount::ZERO,
            stake,
            slash_percentage,
            protocol_fee_bps,
            claim_timeout_minutes,
            deadline: request.deadline,
            required_capabilities: request.required_capabilities,
            milestone_count,
            status: TaskStatus::Open,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        escrow::lock_escrow(txn, &mut task, now)?;

        for (order_index, milestone) in (0u32..).zip(request.milestones) {
            txn.put_milestone(&MilestoneRecord {
                id: milestone.id,
                task_id: task.id.clone(),
                order_index,
                title: milestone.title,
                reward: milestone.reward,
                stake: milestone.stake,
                status: MilestoneStatus::Pending,
                worker_attempts: BTreeMap::new(),
                max_attempts_per_worker: max_attempts,
            })?;
        }

        txn.push_outbox(
            AuditEvent::TaskStatusChanged {
                task_id: task.id.clone(),
                from: None,
                to: TaskStatus::Open,
            },
            now,
        )?;
        tracing::info!(
            task = %task.id,
            creator = %task.creator,
            chain = %task.chain,
            reward = %task.reward,
            milestones = milestone_count,
            "task created"
        );
        Ok(task)
    }

    fn milestone_in_play(
        &self,
        txn: &dyn LedgerTxn,
        task: &TaskRecord,
    ) -> Result<Option<MilestoneId>, MarketError> {
        if !task.has_milestones() {
            return Ok(None);
        }
        let all = txn.milestones(&task.id)?;
        Ok(milestones::in_play(&all).map(|m| m.id.clone()))
    }

    /// Slash and reopen a claimed task whose claim window has passed.
    ///
    /// Returns `None` when the task is not claimed or the claim is still
    /// usable. A submission at exactly the end of the window is on time.
    pub fn expire_claim_if_due(
        &self,
        txn: &mut dyn LedgerTxn,
        task: &mut TaskRecord,
        now: Timestamp,
    ) -> Result<Option<ExpiredClaim>, MarketError> {
        if task.status != TaskStatus::Claimed || !task.is_claim_expired(now) {
            return Ok(None);
        }
        let Some(worker) = task.claimed_by.clone() else {
            return Ok(None);
        };

        let milestone = self.milestone_in_play(txn, task)?;
        let stake = escrow::slash_stake(
            txn,
            task,
            &worker,
            milestone.as_ref(),
            task.slash_percentage.to_bps(),
            now,
        )?;
        workers::update_worker(txn, &worker, now, reputation::record_expired_claim)?;

        let previous = task.status;
        reopen(txn, task)?;
        save_task(txn, task, previous, now)?;

        tracing::warn!(task = %task.id, worker = %worker, "claim expired, stake slashed");
        Ok(Some(ExpiredClaim {
            task_id: task.id.clone(),
            worker,
            stake,
        }))
    }

    pub fn claim(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        worker: &WorkerId,
        now: Timestamp,
    ) -> Result<ClaimOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        let expired_previous = self.expire_claim_if_due(txn, &mut task, now)?;

        if task.status != TaskStatus::Open {
            return Err(MarketError::TaskNotOpen {
                task: task.id,
                status: task.status,
            });
        }
        if task.is_past_deadline(now) {
            return Err(MarketError::DeadlinePassed { task: task.id });
        }
        if &task.creator == worker {
            return Err(MarketError::SelfClaim { task: task.id });
        }

        let record = workers::load_or_default(txn, worker, now)?;
        let missing = record.missing_capabilities(&task.required_capabilities);
        if !missing.is_empty() {
            return Err(MarketError::MissingCapabilities {
                worker: worker.clone(),
                missing: missing.into_iter().map(String::from).collect(),
            });
        }
        txn.put_worker(&record)?;

        let active_milestone = if task.has_milestones() {
            let all = txn.milestones(&task.id)?;
            let next = all
                .iter()
                .find(|m| m.status != MilestoneStatus::Accepted)
                .ok_or_else(|| {
                    MarketError::InvalidTask(format!("task {} has no milestone left", task.id))
                })?;
            if !next.has_attempts_left(worker) {
                return Err(MarketError::MaxAttemptsReached {
                    milestone: next.id.clone(),
                    worker: worker.clone(),
                    max: next.max_attempts_per_worker,
                });
            }
            milestones::set_status(txn, next, MilestoneStatus::Active)?;
            Some(next.id.clone())
        } else {
            None
        };

        let stake = escrow::lock_stake(txn, &task, worker, active_milestone.as_ref(), now)?;

        let previous = task.status;
        task.status = TaskStatus::Claimed;
        task.claimed_by = Some(worker.clone());
        task.claimed_at = Some(now);
        save_task(txn, &mut task, previous, now)?;

        Ok(ClaimOutcome {
            task,
            stake,
            active_milestone,
            expired_previous,
        })
    }

    pub fn release_claim(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        worker: &WorkerId,
        now: Timestamp,
    ) -> Result<ReleaseOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        require_claimant(&task, worker)?;
        if let Some(expired) = self.expire_claim_if_due(txn, &mut task, now)? {
            return Ok(ReleaseOutcome::ClaimExpired(expired));
        }

        let milestone = self.milestone_in_play(txn, &task)?;
        let stake = escrow::unlock_stake(txn, &task, worker, milestone.as_ref(), now)?;

        let previous = task.status;
        reopen(txn, &mut task)?;
        save_task(txn, &mut task, previous, now)?;
        Ok(ReleaseOutcome::Released { stake })
    }

    pub fn submit_result(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        submission_id: &SubmissionId,
        worker: &WorkerId,
        payload: String,
        now: Timestamp,
    ) -> Result<SubmitOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        if task.has_milestones() {
            return Err(MarketError::MilestoneTask(task.id));
        }
        require_claimant(&task, worker)?;
        if let Some(expired) = self.expire_claim_if_due(txn, &mut task, now)? {
            return Ok(SubmitOutcome::ClaimExpired(expired));
        }
        if txn.submission(submission_id)?.is_some() {
            return Err(MarketError::SubmissionExists(submission_id.clone()));
        }

        let submission = SubmissionRecord {
            id: submission_id.clone(),
            task_id: task.id.clone(),
            milestone_id: None,
            worker: worker.clone(),
            payload,
            status: SubmissionStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
        };
        txn.put_submission(&submission)?;

        let previous = task.status;
        task.status = TaskStatus::PendingReview;
        save_task(txn, &mut task, previous, now)?;
        Ok(SubmitOutcome::Submitted(submission))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_milestone(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        milestone_id: &MilestoneId,
        submission_id: &SubmissionId,
        worker: &WorkerId,
        payload: String,
        now: Timestamp,
    ) -> Result<SubmitOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        if !task.has_milestones() {
            return Err(MarketError::NotMilestoneTask(task.id));
        }
        require_claimant(&task, worker)?;
        if let Some(expired) = self.expire_claim_if_due(txn, &mut task, now)? {
            return Ok(SubmitOutcome::ClaimExpired(expired));
        }
        if txn.submission(submission_id)?.is_some() {
            return Err(MarketError::SubmissionExists(submission_id.clone()));
        }

        let all = txn.milestones(&task.id)?;
        let milestone = milestones::find(&all, milestone_id)?;
        if milestone.status != MilestoneStatus::Active {
            return Err(MarketError::MilestoneNotActive {
                milestone: milestone.id.clone(),
                status: milestone.status,
            });
        }
        if !milestone.has_attempts_left(worker) {
            return Err(MarketError::MaxAttemptsReached {
                milestone: milestone.id.clone(),
                worker: worker.clone(),
                max: milestone.max_attempts_per_worker,
            });
        }

        let mut updated = milestone.clone();
        *updated.worker_attempts.entry(worker.clone()).or_insert(0) += 1;
        updated.status = MilestoneStatus::Submitted;
        txn.put_milestone(&updated)?;

        let submission = SubmissionRecord {
            id: submission_id.clone(),
            task_id: task.id.clone(),
            milestone_id: Some(milestone_id.clone()),
            worker: worker.clone(),
            payload,
            status: SubmissionStatus::Pending,
            submitted_at: now,
            reviewed_at: None,
        };
        txn.put_submission(&submission)?;

        let previous = task.status;
        task.status = TaskStatus::PendingReview;
        save_task(txn, &mut task, previous, now)?;
        Ok(SubmitOutcome::Submitted(submission))
    }

    pub fn accept_submission(
        &self,
        txn: &mut dyn LedgerTxn,
        submission_id: &SubmissionId,
        reviewer: &WorkerId,
        now: Timestamp,
    ) -> Result<AcceptOutcome, MarketError> {
        let mut submission = load_submission(txn, submission_id)?;
        require_pending(&submission)?;
        let mut task = load_task(txn, &submission.task_id)?;
        require_creator(&task, reviewer)?;
        if task.status != TaskStatus::PendingReview {
            return Err(MarketError::TaskNotPendingReview {
                task: task.id,
                status: task.status,
            });
        }
        self.accept(txn, &mut task, &mut submission, now)
    }

    /// Pay the submission from escrow and advance the task.
    fn accept(
        &self,
        txn: &mut dyn LedgerTxn,
        task: &mut TaskRecord,
        submission: &mut SubmissionRecord,
        now: Timestamp,
    ) -> Result<AcceptOutcome, MarketError> {
        let worker = submission.worker.clone();
        let all = txn.milestones(&task.id)?;
        let milestone = match &submission.milestone_id {
            Some(id) => Some(milestones::find(&all, id)?.clone()),
            None => None,
        };
        let gross = match &milestone {
            Some(m) => m.reward,
            None => escrow::remaining_escrow(task)?,
        };

        let request = SettlementRequest {
            task_id: task.id.clone(),
            submission_id: submission.id.clone(),
            milestone_id: submission.milestone_id.clone(),
            payer_id: task.creator.clone(),
            worker_id: worker.clone(),
            gross_amount: gross,
            chain: task.chain,
            fee_rate_bps: task.protocol_fee_bps,
            funding: FundingSource::Escrow,
        };
        let settlement = self.settlement.settle_in_txn(txn, &request, now)?;
        if !settlement.idempotent {
            escrow::reserve_escrow(task, settlement.gross)?;
        }

        submission.status = SubmissionStatus::Accepted;
        submission.reviewed_at = Some(now);
        txn.put_submission(submission)?;

        let previous = task.status;
        let is_final = match &milestone {
            Some(m) => {
                milestones::set_status(txn, m, MilestoneStatus::Accepted)?;
                milestones::is_final(&all, &m.id)
            }
            None => true,
        };

        let (next_milestone, escrow_released) = if is_final {
            escrow::unlock_stake(txn, task, &worker, submission.milestone_id.as_ref(), now)?;
            let released = escrow::release_escrow_remainder(txn, task, now)?;
            task.status = TaskStatus::Completed;
            workers::update_worker(txn, &worker, now, reputation::record_completion)?;
            (None, Some(released))
        } else {
            let next = milestones::activate_next(txn, &task.id)?;
            task.status = TaskStatus::Claimed;
            // Each milestone gets a fresh claim window.
            task.claimed_at = Some(now);
            (next, None)
        };
        save_task(txn, task, previous, now)?;

        Ok(AcceptOutcome {
            settlement,
            task_status: task.status,
            next_milestone,
            escrow_released,
        })
    }

    pub fn reject_submission(
        &self,
        txn: &mut dyn LedgerTxn,
        submission_id: &SubmissionId,
        reviewer: &WorkerId,
        now: Timestamp,
    ) -> Result<RejectOutcome, MarketError> {
        let mut submission = load_submission(txn, submission_id)?;
        require_pending(&submission)?;
        let mut task = load_task(txn, &submission.task_id)?;
        require_creator(&task, reviewer)?;
        if task.status != TaskStatus::PendingReview {
            return Err(MarketError::TaskNotPendingReview {
                task: task.id,
                status: task.status,
            });
        }

        submission.status = SubmissionStatus::Rejected;
        submission.reviewed_at = Some(now);
        txn.put_submission(&submission)?;

        let worker = submission.worker.clone();
        let previous = task.status;
        let outcome = match &submission.milestone_id {
            None => {
                task.status = TaskStatus::Claimed;
                task.claimed_at = Some(now);
                RejectOutcome::Resubmit {
                    attempts_left: None,
                }
            }
            Some(milestone_id) => {
                let all = txn.milestones(&task.id)?;
                let milestone = milestones::find(&all, milestone_id)?;
                if milestone.has_attempts_left(&worker) {
                    milestones::set_status(txn, milestone, MilestoneStatus::Active)?;
                    task.status = TaskStatus::Claimed;
                    task.claimed_at = Some(now);
                    RejectOutcome::Resubmit {
                        attempts_left: Some(
                            milestone.max_attempts_per_worker - milestone.attempts_used(&worker),
                        ),
                    }
                } else {
                    let stake = escrow::slash_stake(
                        txn,
                        &task,
                        &worker,
                        Some(milestone_id),
                        task.slash_percentage.to_bps(),
                        now,
                    )?;
                    workers::update_worker(txn, &worker, now, reputation::record_rejection)?;
                    reopen(txn, &mut task)?;
                    RejectOutcome::AttemptsExhausted { stake }
                }
            }
        };
        save_task(txn, &mut task, previous, now)?;

        tracing::info!(submission = %submission.id, task = %task.id, "submission rejected");
        Ok(outcome)
    }

    /// The claimant contests a rejection; the task waits for a resolution.
    pub fn dispute_rejection(
        &self,
        txn: &mut dyn LedgerTxn,
        submission_id: &SubmissionId,
        worker: &WorkerId,
        now: Timestamp,
    ) -> Result<SubmissionRecord, MarketError> {
        let mut submission = load_submission(txn, submission_id)?;
        if submission.status != SubmissionStatus::Rejected {
            return Err(MarketError::SubmissionNotRejected {
                submission: submission.id,
                status: submission.status,
            });
        }
        let mut task = load_task(txn, &submission.task_id)?;
        if &submission.worker != worker {
            return Err(MarketError::NotClaimant {
                task: task.id,
                worker: worker.clone(),
            });
        }
        require_claimant(&task, worker)?;
        if task.is_claim_expired(now) {
            return Err(MarketError::ClaimExpired {
                task: task.id,
                worker: worker.clone(),
            });
        }

        submission.status = SubmissionStatus::Disputed;
        txn.put_submission(&submission)?;

        let previous = task.status;
        task.status = TaskStatus::Disputed;
        save_task(txn, &mut task, previous, now)?;
        Ok(submission)
    }

    pub fn resolve_dispute(
        &self,
        txn: &mut dyn LedgerTxn,
        submission_id: &SubmissionId,
        resolution: DisputeResolution,
        now: Timestamp,
    ) -> Result<ResolveOutcome, MarketError> {
        let mut submission = load_submission(txn, submission_id)?;
        if submission.status != SubmissionStatus::Disputed {
            return Err(MarketError::SubmissionNotDisputed {
                submission: submission.id,
                status: submission.status,
            });
        }
        let mut task = load_task(txn, &submission.task_id)?;
        if task.status != TaskStatus::Disputed {
            return Err(MarketError::TaskNotDisputed {
                task: task.id,
                status: task.status,
            });
        }

        match resolution {
            DisputeResolution::WorkerWins => {
                let accepted = self.accept(txn, &mut task, &mut submission, now)?;
                Ok(ResolveOutcome::Accepted(accepted))
            }
            DisputeResolution::CreatorWins => {
                submission.status = SubmissionStatus::Rejected;
                submission.reviewed_at = Some(now);
                txn.put_submission(&submission)?;

                let worker = submission.worker.clone();
                let stake = escrow::slash_stake(
                    txn,
                    &task,
                    &worker,
                    submission.milestone_id.as_ref(),
                    task.slash_percentage.to_bps(),
                    now,
                )?;
                workers::update_worker(txn, &worker, now, reputation::record_rejection)?;

                let previous = task.status;
                reopen(txn, &mut task)?;
                save_task(txn, &mut task, previous, now)?;
                Ok(ResolveOutcome::Slashed { stake })
            }
        }
    }

    /// Creator withdraws an open task; the escrow is refunded exactly once.
    pub fn cancel_task(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        caller: &WorkerId,
        now: Timestamp,
    ) -> Result<CancelOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        require_creator(&task, caller)?;
        if task.status == TaskStatus::Cancelled {
            tracing::debug!(task = %task.id, "task already cancelled");
            return Ok(RefundOutcome::AlreadyRefunded);
        }
        self.expire_claim_if_due(txn, &mut task, now)?;
        if task.status != TaskStatus::Open {
            return Err(MarketError::TaskNotOpen {
                task: task.id,
                status: task.status,
            });
        }

        let refund = escrow::refund_escrow(txn, &mut task, now)?;
        let previous = task.status;
        task.status = TaskStatus::Cancelled;
        save_task(txn, &mut task, previous, now)?;
        Ok(refund)
    }

    /// Refund an open task whose deadline passed without a claim.
    pub fn refund_expired_task(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        now: Timestamp,
    ) -> Result<RefundOutcome, MarketError> {
        let mut task = load_task(txn, task_id)?;
        if task.status == TaskStatus::Expired {
            tracing::debug!(task = %task.id, "task already expired");
            return Ok(RefundOutcome::AlreadyRefunded);
        }
        self.expire_claim_if_due(txn, &mut task, now)?;
        if task.status != TaskStatus::Open {
            return Err(MarketError::TaskNotOpen {
                task: task.id,
                status: task.status,
            });
        }
        if !task.is_past_deadline(now) {
            return Err(MarketError::DeadlineNotReached { task: task.id });
        }

        let refund = escrow::refund_escrow(txn, &mut task, now)?;
        let previous = task.status;
        task.status = TaskStatus::Expired;
        save_task(txn, &mut task, previous, now)?;
        Ok(refund)
    }
}
