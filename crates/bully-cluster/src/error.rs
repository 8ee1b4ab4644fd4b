//! Cluster error types

use crate::registry::NodeId;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Cluster-specific error types
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The node is simulating a failure and refuses to participate.
    /// This is the only error surfaced across the engine boundary.
    #[error("Node is marked unavailable")]
    Unavailable,

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Unknown peer: no address registered for node {0}")]
    UnknownPeer(NodeId),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    pub fn peer_unreachable<T: Into<String>>(msg: T) -> Self {
        Self::PeerUnreachable(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    /// True when the error means the node intentionally refused service.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        Self::peer_unreachable(format!("HTTP client error: {}", err))
    }
}
