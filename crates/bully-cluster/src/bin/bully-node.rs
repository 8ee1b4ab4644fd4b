//! Bully cluster node binary

use bully_cluster::config::{parse_peer_list, NODE_ID_ENV};
use bully_cluster::{BullyNode, NodeConfig, NodeId};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "bully-node", about = "Bully leader election cluster node")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// This node's identifier (overrides config file and environment)
    #[arg(long)]
    node_id: Option<i64>,

    /// Peer list as `id:host[:port],...` (overrides config file and environment)
    #[arg(long)]
    peers: Option<String>,

    /// Bind address for the HTTP service
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bully_cluster=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    if let Some(id) = cli.node_id {
        config.node_id = NodeId::new(id);
    }
    if let Some(peers) = &cli.peers {
        config.peers = parse_peer_list(peers)?;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    let mut node = BullyNode::new(config)?;
    node.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    node.shutdown().await;

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    if let Some(path) = &cli.config {
        return Ok(NodeConfig::from_file(path)?);
    }
    if std::env::var(NODE_ID_ENV).is_ok() {
        return Ok(NodeConfig::from_env()?);
    }
    // Defaults, to be filled in by CLI overrides.
    Ok(NodeConfig::default())
}
