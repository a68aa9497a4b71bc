//! Milestone progression: exactly one milestone is in play at a time and
//! they advance strictly by `order_index`.

use bounty_store::{LedgerTxn, MilestoneRecord, MilestoneStatus};
use bounty_types::{MilestoneId, TaskId};

use crate::MarketError;

/// The milestone currently being worked on or reviewed.
pub fn in_play(milestones: &[MilestoneRecord]) -> Option<&MilestoneRecord> {
    milestones.iter().find(|m| {
        matches!(
            m.status,
            MilestoneStatus::Active | MilestoneStatus::Submitted
        )
    })
}

pub fn find<'a>(
    milestones: &'a [MilestoneRecord],
    id: &MilestoneId,
) -> Result<&'a MilestoneRecord, MarketError> {
    milestones
        .iter()
        .find(|m| &m.id == id)
        .ok_or_else(|| MarketError::MilestoneNotFound(id.clone()))
}

/// Whether every milestone other than `id` is already accepted.
pub fn is_final(milestones: &[MilestoneRecord], id: &MilestoneId) -> bool {
    milestones
        .iter()
        .filter(|m| &m.id != id)
        .all(|m| m.status == MilestoneStatus::Accepted)
}

/// Activate the first milestone not yet accepted.
pub fn activate_next(
    txn: &mut dyn LedgerTxn,
    task: &TaskId,
) -> Result<Option<MilestoneId>, MarketError> {
    let milestones = txn.milestones(task)?;
    let Some(mut next) = milestones
        .into_iter()
        .find(|m| m.status != MilestoneStatus::Accepted)
    else {
        return Ok(None);
    };
    next.status = MilestoneStatus::Active;
    txn.put_milestone(&next)?;
    Ok(Some(next.id))
}

/// Put every unaccepted milestone back to pending (claim dropped).
pub fn reset(txn: &mut dyn LedgerTxn, task: &TaskId) -> Result<(), MarketError> {
    for mut milestone in txn.milestones(task)? {
        if milestone.status != MilestoneStatus::Accepted
            && milestone.status != MilestoneStatus::Pending
        {
            milestone.status = MilestoneStatus::Pending;
            txn.put_milestone(&milestone)?;
        }
    }
    Ok(())
}

pub fn set_status(
    txn: &mut dyn LedgerTxn,
    milestone: &MilestoneRecord,
    status: MilestoneStatus,
) -> Result<MilestoneRecord, MarketError> {
    let mut updated = milestone.clone();
    updated.status = status;
    txn.put_milestone(&updated)?;
    Ok(updated)
}
