//! Bully leader election cluster node
//!
//! A fixed set of peers repeatedly agrees on a single leader: the
//! highest reachable node identifier wins, and a periodic health probe
//! of the believed leader triggers re-election when it fails. This
//! crate is one node's worth of that protocol: the election engine,
//! the heartbeat monitor, the HTTP transport between peers and the
//! HTTP surface each node exposes.

pub mod config;
pub mod election;
pub mod error;
pub mod http;
pub mod monitor;
pub mod registry;
pub mod state;
pub mod transport;

pub use config::{NodeConfig, PeerConfig};
pub use election::ElectionEngine;
pub use error::{ClusterError, Result};
pub use monitor::{HeartbeatMonitor, MonitorHandle};
pub use registry::{NodeId, PeerRegistry};
pub use state::{NodeState, NodeStatus};
pub use transport::{HttpPeerTransport, PeerTransport};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// One cluster node: engine, heartbeat monitor and HTTP service
pub struct BullyNode {
    config: NodeConfig,
    engine: Arc<ElectionEngine>,
    monitor: Option<MonitorHandle>,
    server: Option<JoinHandle<()>>,
}

impl BullyNode {
    /// Wire up a node from its configuration
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(PeerRegistry::new(config.peer_map()));
        let state = Arc::new(NodeState::new());
        let transport = Arc::new(HttpPeerTransport::new(config.probe_timeout)?);
        let engine = Arc::new(ElectionEngine::new(
            config.node_id,
            registry,
            state,
            transport,
        ));

        Ok(Self {
            config,
            engine,
            monitor: None,
            server: None,
        })
    }

    /// The election engine backing this node
    pub fn engine(&self) -> Arc<ElectionEngine> {
        self.engine.clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Bind the HTTP service, determine the initial leader and start
    /// the heartbeat monitor
    pub async fn start(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Node {} listening on {} with {} known peer(s)",
            self.config.node_id,
            local_addr,
            self.config.peers.len()
        );

        let app = http::router(self.engine.clone());
        self.server = Some(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!("HTTP server failed: {}", err);
            }
        }));

        self.engine.determine_initial_leader().await;

        let monitor =
            HeartbeatMonitor::new(self.engine.clone(), self.config.heartbeat_interval).spawn();
        self.monitor = Some(monitor);

        Ok(())
    }

    /// Stop the heartbeat monitor and the HTTP service
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down node {}", self.config.node_id);
        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
