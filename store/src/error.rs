use thiserror::Error;

/// Failures surfaced by a ledger backend. Missing records are `Ok(None)` at
/// the read seam and duplicate idempotency keys are reported by
/// `insert_idempotency_key`, so neither appears here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger backend failed: {0}")]
    Backend(String),

    #[error("ledger record could not be encoded or decoded: {0}")]
    Serialization(String),

    /// An index or counter disagrees with the records it points at.
    #[error("ledger store is inconsistent: {0}")]
    Corruption(String),
}
