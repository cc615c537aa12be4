//! PBFT replica node.
//!
//! # Usage
//!
//! ```bash
//! # Start one replica per peer-table entry
//! pbft-replica Apple
//! pbft-replica Ball
//! pbft-replica Candy
//! pbft-replica Dog
//!
//! # Submit a request to the primary
//! curl -X POST http://127.0.0.1:1111/req \
//!     -H 'content-type: application/json' \
//!     -d '{"timestamp":100,"client_id":"c1","operation":"SET x=1"}'
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use pbft_consensus::ConsensusConfig;
use pbft_node::rpc::{RpcServer, RpcServerConfig, RpcState};
use pbft_node::{bootstrap_view, HttpTransport, Node, NodeRunner, PeerTable};
use pbft_types::NodeId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// PBFT replica node.
///
/// Runs one replica of the fixed four-node deployment, listening on the
/// address the peer table assigns to its id.
#[derive(Parser, Debug)]
#[command(name = "pbft-replica")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Replica id; must be a key of the peer table.
    node_id: String,

    /// Alarm period for flushing buffered messages, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    resolve_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let peers = Arc::new(PeerTable::bootstrap());
    let node_id = NodeId::from(cli.node_id.as_str());
    let Some(addr) = peers.address(&node_id) else {
        bail!("unknown node id {node_id}; expected one of the peer-table replicas");
    };
    let listen_addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid listen address {addr}"))?;

    let config = ConsensusConfig {
        resolve_interval: Duration::from_millis(cli.resolve_interval_ms),
        ..ConsensusConfig::default()
    };
    let node = Node::new(node_id.clone(), bootstrap_view(), config);

    let transport = Arc::new(HttpTransport::new(peers.clone()));
    let handle = NodeRunner::spawn(node, peers, transport);

    let rpc_state = RpcState {
        inbound: handle.inbound(),
        status: handle.status(),
    };
    let server = RpcServer::new(RpcServerConfig { listen_addr }, rpc_state)
        .start()
        .await
        .context("failed to start http listener")?;

    info!(node = %node_id, addr = %server.local_addr(), "replica started");

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!(node = %node_id, "shutting down");
    server.abort();
    handle.abort();

    Ok(())
}
