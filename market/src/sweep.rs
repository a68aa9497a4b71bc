//! Bulk application of lazy expiry.
//!
//! Expiry is normally applied by whichever command next touches a task.
//! The sweep finds tasks that nobody touched and applies the same rules,
//! one task per transaction so a failing task never blocks the rest.

use bounty_escrow::RefundOutcome;
use bounty_store::{EscrowStatus, LedgerRead, LedgerTxn, TaskStatus};
use bounty_types::{TaskId, Timestamp};

use crate::machine::load_task;
use crate::{ExpiredClaim, MarketError, TaskMarket};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepAction {
    ClaimExpired(ExpiredClaim),
    Expired(RefundOutcome),
}

/// Tasks with an expired claim or an unclaimed open task past its deadline.
pub fn candidates<R: LedgerRead + ?Sized>(
    reader: &R,
    now: Timestamp,
) -> Result<Vec<TaskId>, MarketError> {
    Ok(reader
        .tasks()?
        .into_iter()
        .filter(|task| match task.status {
            TaskStatus::Claimed => task.is_claim_expired(now),
            TaskStatus::Open => {
                task.is_past_deadline(now) && task.escrow_status == EscrowStatus::Locked
            }
            _ => false,
        })
        .map(|task| task.id)
        .collect())
}

impl TaskMarket {
    /// Apply every expiry rule that is due for one task.
    pub fn sweep_task(
        &self,
        txn: &mut dyn LedgerTxn,
        task_id: &TaskId,
        now: Timestamp,
    ) -> Result<Vec<SweepAction>, MarketError> {
        let mut task = load_task(txn, task_id)?;
        let mut actions = Vec::new();

        if let Some(expired) = self.expire_claim_if_due(txn, &mut task, now)? {
            actions.push(SweepAction::ClaimExpired(expired));
        }
        if task.status == TaskStatus::Open && task.is_past_deadline(now) {
            let refund = self.refund_expired_task(txn, task_id, now)?;
            actions.push(SweepAction::Expired(refund));
        }
        Ok(actions)
    }
}
