//! Worker records as seen by the state machine.

use std::collections::BTreeSet;

use bounty_store::{LedgerTxn, WorkerRecord};
use bounty_types::params::NEUTRAL_REPUTATION_BPS;
use bounty_types::{Timestamp, WorkerId};

use crate::MarketError;

/// Create or update a worker's capability set, keeping its history.
pub fn upsert_worker(
    txn: &mut dyn LedgerTxn,
    id: &WorkerId,
    capabilities: BTreeSet<String>,
    now: Timestamp,
) -> Result<WorkerRecord, MarketError> {
    let worker = match txn.worker(id)? {
        Some(mut existing) => {
            existing.capabilities = capabilities;
            existing.updated_at = now;
            existing
        }
        None => WorkerRecord::new(id.clone(), capabilities, NEUTRAL_REPUTATION_BPS, now),
    };
    txn.put_worker(&worker)?;
    tracing::debug!(worker = %id, "worker record upserted");
    Ok(worker)
}

/// The stored record, or a fresh one for a worker the registration layer
/// has not reported yet.
pub fn load_or_default(
    txn: &dyn LedgerTxn,
    id: &WorkerId,
    now: Timestamp,
) -> Result<WorkerRecord, MarketError> {
    Ok(txn.worker(id)?.unwrap_or_else(|| {
        WorkerRecord::new(id.clone(), BTreeSet::new(), NEUTRAL_REPUTATION_BPS, now)
    }))
}

/// Apply `update` to the worker's record and store it.
pub fn update_worker<F>(
    txn: &mut dyn LedgerTxn,
    id: &WorkerId,
    now: Timestamp,
    update: F,
) -> Result<WorkerRecord, MarketError>
where
    F: FnOnce(&mut WorkerRecord),
{
    let mut worker = load_or_default(txn, id, now)?;
    update(&mut worker);
    worker.updated_at = now;
    txn.put_worker(&worker)?;
    Ok(worker)
}
