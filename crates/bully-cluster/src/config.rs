//! Node configuration management

use crate::error::{ClusterError, Result};
use crate::registry::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable holding this node's identifier
pub const NODE_ID_ENV: &str = "NODE_ID";
/// Environment variable holding the full peer set as `id:host,...`
pub const ALL_NODES_ENV: &str = "ALL_NODES";

const DEFAULT_PEER_PORT: u16 = 8080;

/// A single peer entry: identifier and reachable base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: NodeId,
    pub address: String,
}

/// Startup configuration for one cluster node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's unique identifier
    pub node_id: NodeId,

    /// Address the HTTP service binds to
    pub bind_address: SocketAddr,

    /// The full, fixed peer set (may include this node itself)
    pub peers: Vec<PeerConfig>,

    /// Period of the leader health check
    pub heartbeat_interval: Duration,

    /// Per-request timeout for peer calls; must stay well below the
    /// heartbeat period so one dead peer cannot stall a tick
    pub probe_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(0),
            bind_address: "0.0.0.0:8080".parse().unwrap(),
            peers: vec![],
            heartbeat_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_millis(500),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::configuration(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClusterError::configuration(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClusterError::configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClusterError::configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load configuration from `NODE_ID` and `ALL_NODES`
    pub fn from_env() -> Result<Self> {
        let node_id = std::env::var(NODE_ID_ENV)
            .map_err(|_| ClusterError::configuration(format!("{} is not set", NODE_ID_ENV)))?
            .parse::<NodeId>()
            .map_err(|e| ClusterError::configuration(format!("Invalid {}: {}", NODE_ID_ENV, e)))?;

        let peer_list = std::env::var(ALL_NODES_ENV)
            .map_err(|_| ClusterError::configuration(format!("{} is not set", ALL_NODES_ENV)))?;

        Ok(Self {
            node_id,
            peers: parse_peer_list(&peer_list)?,
            ..Self::default()
        })
    }

    /// Peer set as a map, ready for the registry
    pub fn peer_map(&self) -> BTreeMap<NodeId, String> {
        self.peers
            .iter()
            .map(|peer| (peer.id, peer.address.clone()))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_id.raw() < 0 {
            return Err(ClusterError::configuration(
                "Node identifier must be non-negative",
            ));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.id.raw() < 0 {
                return Err(ClusterError::configuration(format!(
                    "Peer identifier {} must be non-negative",
                    peer.id
                )));
            }
            if !seen.insert(peer.id) {
                return Err(ClusterError::configuration(format!(
                    "Duplicate peer identifier {}",
                    peer.id
                )));
            }
            if !peer.address.starts_with("http://") && !peer.address.starts_with("https://") {
                return Err(ClusterError::configuration(format!(
                    "Peer {} address must be an http(s) URL: {}",
                    peer.id, peer.address
                )));
            }
        }

        if self.heartbeat_interval < Duration::from_millis(100) {
            return Err(ClusterError::configuration(
                "Heartbeat interval must be at least 100ms",
            ));
        }

        if self.probe_timeout.is_zero() {
            return Err(ClusterError::configuration("Probe timeout must be non-zero"));
        }

        if self.probe_timeout >= self.heartbeat_interval {
            return Err(ClusterError::configuration(
                "Probe timeout must be shorter than the heartbeat interval",
            ));
        }

        Ok(())
    }
}

/// Parse the compact `id:host[:port]` comma-separated peer format
///
/// Accepts full URLs too: `1:node1`, `2:node2:9090` and
/// `3:http://node3:8080` are all valid entries. Bare hosts get
/// `http://` and port 8080.
pub fn parse_peer_list(list: &str) -> Result<Vec<PeerConfig>> {
    let mut peers = vec![];
    for entry in list.split(',').filter(|entry| !entry.trim().is_empty()) {
        let (id_part, address_part) = entry.trim().split_once(':').ok_or_else(|| {
            ClusterError::configuration(format!("Malformed peer entry '{}', expected id:host", entry))
        })?;

        let id = id_part.parse::<NodeId>().map_err(|e| {
            ClusterError::configuration(format!("Invalid peer identifier '{}': {}", id_part, e))
        })?;

        let address = if address_part.starts_with("http://") || address_part.starts_with("https://")
        {
            address_part.to_string()
        } else if address_part.contains(':') {
            format!("http://{}", address_part)
        } else {
            format!("http://{}:{}", address_part, DEFAULT_PEER_PORT)
        };

        peers.push(PeerConfig { id, address });
    }
    Ok(peers)
}
