//! Bounty daemon: entry point for running the ledger engine.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use bounty_node::{init_logging, MarketNode, NodeConfig, StorageKind};
use bounty_types::Chain;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bounty-daemon", about = "Escrow and settlement engine for the task marketplace")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "BOUNTY_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the LMDB ledger.
    #[arg(long, env = "BOUNTY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend: "lmdb" or "memory".
    #[arg(long, env = "BOUNTY_STORAGE")]
    storage: Option<String>,

    /// Chains to bootstrap protocol accounts for (comma-separated: "ETH,USD").
    #[arg(long, env = "BOUNTY_CHAINS", value_delimiter = ',')]
    chains: Vec<Chain>,

    /// Default protocol fee in basis points.
    #[arg(long, env = "BOUNTY_DEFAULT_FEE_BPS")]
    default_fee_bps: Option<u32>,

    /// Seconds between expiry sweeps; 0 disables the sweeper.
    #[arg(long, env = "BOUNTY_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Log output: "human" or "json".
    #[arg(long, env = "BOUNTY_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BOUNTY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print Prometheus metrics on shutdown.
    #[arg(long, env = "BOUNTY_ENABLE_METRICS")]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the engine until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML.
    Config,
    /// Print protocol fee and slash income per chain.
    Balances,
    /// Print the newest ledger entries as JSON lines.
    Entries {
        #[arg(long)]
        chain: Option<Chain>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn parse_storage(s: &str) -> anyhow::Result<StorageKind> {
    match s.to_lowercase().as_str() {
        "lmdb" => Ok(StorageKind::Lmdb),
        "memory" => Ok(StorageKind::Memory),
        other => anyhow::bail!("unknown storage backend {other:?}"),
    }
}

/// File settings first, then CLI flags and env vars on top.
fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(storage) = &cli.storage {
        config.storage = parse_storage(storage)?;
    }
    if !cli.chains.is_empty() {
        config.chains = cli.chains.clone();
    }
    if let Some(fee) = cli.default_fee_bps {
        config.default_fee_bps = fee;
    }
    if let Some(secs) = cli.sweep_interval_secs {
        config.sweep_interval_secs = secs;
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.enable_metrics |= cli.metrics;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Run => {
            init_logging(config.log_format()?, &config.log_level)?;
            let started = Instant::now();
            let enable_metrics = config.enable_metrics;

            tracing::info!(
                storage = ?config.storage,
                data_dir = %config.data_dir.display(),
                chains = ?config.chains,
                "starting bounty engine"
            );
            let node = std::sync::Arc::new(MarketNode::open(config)?);
            let tasks = node.start();
            tasks.run_until_signal().await?;

            if enable_metrics {
                println!("{}", node.metrics().render()?);
            }
            tracing::info!(
                uptime = %bounty_utils::format_duration(started.elapsed()),
                "bounty daemon exited cleanly"
            );
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Balances => {
            bounty_utils::init_tracing(&config.log_level);
            let node = MarketNode::open(config)?;
            for (chain, account) in node.get_protocol_balances()? {
                println!("{chain}\tavailable={}\tlocked={}", account.available, account.locked);
            }
        }
        Command::Entries { chain, limit } => {
            bounty_utils::init_tracing(&config.log_level);
            let node = MarketNode::open(config)?;
            for entry in node.list_ledger_entries(chain, limit)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }

    Ok(())
}
