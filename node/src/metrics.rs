//! Prometheus metrics for the ledger engine.
//!
//! Counters cover every committed money movement and every failed command
//! (labelled by error code); the outbox backlog is a gauge refreshed by the
//! drainer. [`NodeMetrics`] owns a dedicated [`Registry`] that can be
//! rendered in the Prometheus text exposition format.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Settlements that moved money.
    pub settlements: IntCounter,
    /// Settlement attempts answered from the idempotency index.
    pub settlement_replays: IntCounter,
    pub stake_locks: IntCounter,
    pub stake_unlocks: IntCounter,
    pub stake_slashes: IntCounter,
    /// Task escrows returned to their creator (cancel or deadline).
    pub escrow_refunds: IntCounter,
    /// Claims that timed out and were slashed.
    pub claims_expired: IntCounter,
    pub deposits: IntCounter,
    pub withdrawals: IntCounter,
    /// Failed commands by error code.
    pub command_failures: IntCounterVec,
    /// Outbox messages handed to the audit sink.
    pub outbox_delivered: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Undelivered outbox messages seen by the last drain pass.
    pub outbox_backlog: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let settlements = counter(
            &registry,
            "bounty_settlements_total",
            "Settlements that transferred funds",
        )?;
        let settlement_replays = counter(
            &registry,
            "bounty_settlement_replays_total",
            "Settlement attempts answered idempotently",
        )?;
        let stake_locks = counter(&registry, "bounty_stake_locks_total", "Stakes locked")?;
        let stake_unlocks = counter(&registry, "bounty_stake_unlocks_total", "Stakes unlocked")?;
        let stake_slashes = counter(&registry, "bounty_stake_slashes_total", "Stakes slashed")?;
        let escrow_refunds = counter(
            &registry,
            "bounty_escrow_refunds_total",
            "Task escrows refunded to creators",
        )?;
        let claims_expired = counter(
            &registry,
            "bounty_claims_expired_total",
            "Claims that timed out and were slashed",
        )?;
        let deposits = counter(&registry, "bounty_deposits_total", "Deposits credited")?;
        let withdrawals = counter(
            &registry,
            "bounty_withdrawals_total",
            "Withdrawals debited and queued",
        )?;
        let command_failures = register_int_counter_vec_with_registry!(
            Opts::new(
                "bounty_command_failures_total",
                "Commands rolled back, by error code"
            ),
            &["code"],
            registry
        )?;
        let outbox_delivered = counter(
            &registry,
            "bounty_outbox_delivered_total",
            "Outbox messages delivered to the audit sink",
        )?;

        let outbox_backlog = register_int_gauge_with_registry!(
            Opts::new(
                "bounty_outbox_backlog",
                "Undelivered outbox messages at the last drain"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            settlements,
            settlement_replays,
            stake_locks,
            stake_unlocks,
            stake_slashes,
            escrow_refunds,
            claims_expired,
            deposits,
            withdrawals,
            command_failures,
            outbox_delivered,
            outbox_backlog,
        })
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_labelled_by_code() {
        let metrics = NodeMetrics::new().unwrap();
        metrics
            .command_failures
            .with_label_values(&["insufficient_balance"])
            .inc();
        metrics.settlements.inc_by(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("bounty_settlements_total 2"));
        assert!(text.contains("code=\"insufficient_balance\""));
    }
}
