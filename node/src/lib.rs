//! Bounty ledger engine: wires the market, escrow and settlement crates to a
//! storage backend and runs the background work around them.
//!
//! The engine:
//! - Runs every ledger command in exactly one write transaction
//! - Selects the in-memory or LMDB backend from configuration
//! - Drains the audit outbox to a sink and hands withdrawals to a chain provider
//! - Sweeps expired claims and task deadlines on an interval
//! - Exposes counters for settlements, stake movements and rejections

pub mod command;
pub mod config;
pub mod error;
pub mod funds;
pub mod legacy;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod outbox;
pub mod provider;
pub mod shutdown;
pub mod sink;
pub mod storage;
pub mod tracing_spans;

pub use command::{CommandOutcome, LedgerCommand};
pub use config::{NodeConfig, StorageKind};
pub use error::NodeError;
pub use funds::{DepositOutcome, WithdrawalOutcome};
pub use legacy::LegacyBalance;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{BackgroundTasks, MarketNode, SweepReport};
pub use outbox::OutboxDrainer;
pub use provider::{
    ChainProvider, DepositAddress, DepositStatus, NullChainProvider, ProviderError,
    WithdrawalRequest, WithdrawalStatus,
};
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use sink::{AuditSink, RecordingSink, TracingSink};
pub use storage::EngineStore;
