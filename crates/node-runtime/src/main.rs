//! # Orbis Ethica Node
//!
//! ```text
//! node-runtime --config node.toml --genesis genesis.json --port 6001 --seed 10.0.0.2:6000
//! ```
//!
//! Exits non-zero when the node cannot start: unreadable configuration,
//! malformed genesis, an identity key that cannot be loaded or decrypted,
//! or a ledger that cannot be opened.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ledger_telemetry::{init_telemetry, TelemetryConfig};
use node_runtime::{NodeConfig, NodeContainer, NodeRuntime};

/// Orbis Ethica ledger node
#[derive(Parser, Debug)]
#[command(name = "node-runtime")]
#[command(about = "Replicated ledger node with proof-of-work blocks and gossip sync")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Genesis document (overrides `genesis_path`)
    #[arg(short, long)]
    genesis: Option<PathBuf>,

    /// P2P listening port (overrides config and OE_P2P_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Seed peer `host:port`; repeatable
    #[arg(short, long = "seed")]
    seeds: Vec<String>,

    /// Validate and sync but never mine
    #[arg(long)]
    no_mine: bool,
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid configuration override in environment")?;

    if let Some(genesis) = &args.genesis {
        config.genesis_path = genesis.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    config.network.seed_nodes.extend(args.seeds.iter().cloned());
    if args.no_mine {
        config.mining.enabled = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = load_config(&args)?;
    info!(
        genesis = %config.genesis_path.display(),
        port = config.network.port,
        seeds = config.network.seed_nodes.len(),
        mining = config.mining.enabled,
        "Configuration loaded"
    );

    let container = NodeContainer::build(config).context("Node failed to start")?;
    let runtime = NodeRuntime::launch(container)
        .await
        .context("Node failed to start")?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    runtime.shutdown().await;
    Ok(())
}
