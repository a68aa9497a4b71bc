//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bounty_ledger::journal::MAX_ENTRY_PAGE;
use bounty_types::params::{DEFAULT_FEE_BPS, NEUTRAL_REPUTATION_BPS};
use bounty_types::{BasisPoints, Chain, ProtocolParams};

use crate::logging::LogFormat;
use crate::NodeError;

/// Which backend holds the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory only; everything is lost on exit.
    Memory,
    /// LMDB environment under `data_dir`.
    Lmdb,
}

/// Configuration for a ledger engine.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so
/// an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for ledger storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_storage")]
    pub storage: StorageKind,

    /// LMDB map size in bytes.
    #[serde(default = "default_lmdb_map_size")]
    pub lmdb_map_size: usize,

    /// Chains with a protocol account; bootstrapped at startup.
    #[serde(default = "default_chains")]
    pub chains: Vec<Chain>,

    #[serde(default = "default_fee_bps")]
    pub default_fee_bps: u32,

    #[serde(default = "default_claim_timeout_minutes")]
    pub default_claim_timeout_minutes: u32,

    #[serde(default = "default_max_attempts_per_worker")]
    pub default_max_attempts_per_worker: u32,

    /// Upper bound on a `list_ledger_entries` page.
    #[serde(default = "default_max_entry_page")]
    pub max_entry_page: usize,

    #[serde(default = "default_outbox_poll_interval_ms")]
    pub outbox_poll_interval_ms: u64,

    #[serde(default = "default_outbox_batch_size")]
    pub outbox_batch_size: usize,

    /// Background expiry sweep period; 0 disables the sweep.
    #[serde(default)]
    pub sweep_interval_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./bounty_data")
}

fn default_storage() -> StorageKind {
    StorageKind::Lmdb
}

fn default_lmdb_map_size() -> usize {
    1 << 30
}

fn default_chains() -> Vec<Chain> {
    Chain::ALL.to_vec()
}

fn default_fee_bps() -> u32 {
    DEFAULT_FEE_BPS.value()
}

fn default_claim_timeout_minutes() -> u32 {
    60
}

fn default_max_attempts_per_worker() -> u32 {
    3
}

fn default_max_entry_page() -> usize {
    MAX_ENTRY_PAGE
}

fn default_outbox_poll_interval_ms() -> u64 {
    500
}

fn default_outbox_batch_size() -> usize {
    64
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// A memory-backed configuration for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageKind::Memory,
            ..Self::default()
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.params()?;
        self.log_format()?;
        if self.chains.is_empty() {
            return Err(NodeError::Config("at least one chain is required".into()));
        }
        if self.outbox_batch_size == 0 {
            return Err(NodeError::Config("outbox_batch_size must be positive".into()));
        }
        if self.outbox_poll_interval_ms == 0 {
            return Err(NodeError::Config(
                "outbox_poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The protocol parameters this configuration selects.
    pub fn params(&self) -> Result<ProtocolParams, NodeError> {
        let default_fee_bps = BasisPoints::new(self.default_fee_bps)
            .map_err(|e| NodeError::Config(format!("default_fee_bps: {e}")))?;
        if self.default_claim_timeout_minutes == 0 {
            return Err(NodeError::Config(
                "default_claim_timeout_minutes must be positive".into(),
            ));
        }
        if self.default_max_attempts_per_worker == 0 {
            return Err(NodeError::Config(
                "default_max_attempts_per_worker must be positive".into(),
            ));
        }
        Ok(ProtocolParams {
            default_fee_bps,
            default_claim_timeout_minutes: self.default_claim_timeout_minutes,
            default_max_attempts_per_worker: self.default_max_attempts_per_worker,
            neutral_reputation_bps: NEUTRAL_REPUTATION_BPS,
            max_entry_page: self.max_entry_page.clamp(1, MAX_ENTRY_PAGE),
        })
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn outbox_poll_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_poll_interval_ms)
    }

    /// `None` when the background sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: default_storage(),
            lmdb_map_size: default_lmdb_map_size(),
            chains: default_chains(),
            default_fee_bps: default_fee_bps(),
            default_claim_timeout_minutes: default_claim_timeout_minutes(),
            default_max_attempts_per_worker: default_max_attempts_per_worker(),
            max_entry_page: default_max_entry_page(),
            outbox_poll_interval_ms: default_outbox_poll_interval_ms(),
            outbox_batch_size: default_outbox_batch_size(),
            sweep_interval_secs: 0,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.default_fee_bps, 250);
        assert_eq!(config.chains, vec![Chain::Eth, Chain::Btc, Chain::Usd]);
        assert_eq!(config.storage, StorageKind::Lmdb);
        assert_eq!(config.sweep_interval(), None);
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            storage = "memory"
            chains = ["ETH"]
            default_fee_bps = 300
            sweep_interval_secs = 30
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.chains, vec![Chain::Eth]);
        assert_eq!(config.params().unwrap().default_fee_bps.value(), 300);
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = NodeConfig {
            default_fee_bps: 10_001,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let config = NodeConfig {
            chains: Vec::new(),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            log_format: "xml".into(),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(NodeConfig::from_toml_str(r#"chains = ["DOGE"]"#).is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/bounty.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
