//! Node identifiers and the static peer registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Unique, totally ordered identifier for a cluster node
///
/// The raw value `-1` is reserved as the "no known leader" sentinel and
/// is never a valid member identifier.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    pub const fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Immutable mapping from node identifier to reachable base URL
///
/// Built once at startup and read-only thereafter. May contain an entry
/// for this node itself; the election engine skips it where needed.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    peers: BTreeMap<NodeId, String>,
}

impl PeerRegistry {
    pub fn new(peers: BTreeMap<NodeId, String>) -> Self {
        Self { peers }
    }

    /// Resolve the base URL for a node, if registered
    pub fn address(&self, id: NodeId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    /// Highest identifier across all registered peers and `self_id`
    pub fn max_id(&self, self_id: NodeId) -> NodeId {
        self.peers
            .keys()
            .copied()
            .max()
            .map_or(self_id, |max| max.max(self_id))
    }

    /// Peers with an identifier strictly greater than `id`, ascending
    pub fn higher_than(&self, id: NodeId) -> Vec<(NodeId, &str)> {
        self.peers
            .iter()
            .filter(|(peer, _)| **peer > id)
            .map(|(peer, url)| (*peer, url.as_str()))
            .collect()
    }

    /// All registered peers except `id`, ascending
    pub fn others(&self, id: NodeId) -> Vec<(NodeId, &str)> {
        self.peers
            .iter()
            .filter(|(peer, _)| **peer != id)
            .map(|(peer, url)| (*peer, url.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
