//! Worker reputation derived from claim history.

use bounty_store::WorkerRecord;
use bounty_types::params::NEUTRAL_REPUTATION_BPS;
use bounty_types::BasisPoints;

/// `10000 * completed / (completed + expired + rejected)`, or neutral with no history.
pub fn compute(worker: &WorkerRecord) -> u32 {
    let completed = u128::from(worker.tasks_completed);
    let finished = completed
        + u128::from(worker.claims_expired)
        + u128::from(worker.submissions_rejected);
    if finished == 0 {
        return NEUTRAL_REPUTATION_BPS;
    }
    // completed <= finished, so the quotient fits in 0..=10000.
    (completed * u128::from(BasisPoints::MAX) / finished) as u32
}

pub fn record_completion(worker: &mut WorkerRecord) {
    worker.tasks_completed += 1;
    worker.reputation_bps = compute(worker);
}

pub fn record_expired_claim(worker: &mut WorkerRecord) {
    worker.claims_expired += 1;
    worker.reputation_bps = compute(worker);
}

pub fn record_rejection(worker: &mut WorkerRecord) {
    worker.submissions_rejected += 1;
    worker.reputation_bps = compute(worker);
}
