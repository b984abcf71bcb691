//! Blockflow node binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod network;
mod node;

use config::NodeConfig;
use node::Node;

/// Sharded proof-of-work blockchain node.
#[derive(Parser, Debug)]
#[command(name = "flow-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "flow-node.toml")]
    config: PathBuf,

    /// P2P bind address override
    #[arg(long)]
    p2p_bind: Option<String>,

    /// Enable mining
    #[arg(long)]
    mining: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = NodeConfig::load(&args.config)?;
    if let Some(bind) = args.p2p_bind {
        config.network.bind_address = bind;
    }
    if args.mining {
        config.mining.enabled = true;
    }

    let _node = Node::start(config)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
