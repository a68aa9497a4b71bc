//! Pre-built [`tracing::Span`] constructors for engine operations.
//!
//! Consistent span names and field sets make it easy to correlate the
//! journal, stake and settlement events a single command produced.

use tracing::{info_span, Span};

/// Span covering one engine command from transaction start to commit.
pub fn command_span(command: &'static str) -> Span {
    info_span!("command", command)
}

/// Span covering one settlement attempt.
pub fn settlement_span(settlement_id: &str) -> Span {
    info_span!("settlement", id = %settlement_id)
}

/// Span covering one outbox drain pass.
pub fn drain_span(batch: usize) -> Span {
    info_span!("outbox_drain", batch)
}

/// Span covering one expiry sweep.
pub fn sweep_span() -> Span {
    info_span!("expiry_sweep")
}
