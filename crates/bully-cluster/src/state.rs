//! Concurrency-safe node state

use crate::registry::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Sentinel value meaning no leader is currently known
pub const NO_LEADER: i64 = -1;

/// The single mutable record of this node's protocol state
///
/// Shared between the heartbeat task and inbound protocol handlers.
/// Every field is an atomic; no lock spans the election algorithm's
/// multi-step logic, so overlapping elections are possible and must be
/// tolerated by the engine.
#[derive(Debug)]
pub struct NodeState {
    leader: AtomicI64,
    election_in_progress: AtomicBool,
    available: AtomicBool,
}

impl NodeState {
    /// Create fresh state: no leader, no election, available
    pub fn new() -> Self {
        Self {
            leader: AtomicI64::new(NO_LEADER),
            election_in_progress: AtomicBool::new(false),
            available: AtomicBool::new(true),
        }
    }

    /// Current leader belief, `None` while unknown
    pub fn leader(&self) -> Option<NodeId> {
        match self.leader.load(Ordering::SeqCst) {
            NO_LEADER => None,
            id => Some(NodeId::new(id)),
        }
    }

    /// Raw leader value, `-1` while unknown
    pub fn leader_raw(&self) -> i64 {
        self.leader.load(Ordering::SeqCst)
    }

    pub fn set_leader(&self, id: NodeId) {
        self.leader.store(id.raw(), Ordering::SeqCst);
    }

    /// Invalidate the leader belief
    pub fn clear_leader(&self) {
        self.leader.store(NO_LEADER, Ordering::SeqCst);
    }

    /// Atomically claim the election guard
    ///
    /// Compare-and-set false -> true; returns whether this caller won.
    /// A plain read-then-write would race two concurrent initiations.
    pub fn begin_election(&self) -> bool {
        self.election_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the election guard
    pub fn end_election(&self) {
        self.election_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn election_in_progress(&self) -> bool {
        self.election_in_progress.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Set the availability flag, returning the previous value
    pub fn set_available(&self, flag: bool) -> bool {
        self.available.swap(flag, Ordering::SeqCst)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot of a node's state, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// This node's identifier
    pub node_id: NodeId,
    /// Believed leader, `-1` while unknown
    pub leader_id: i64,
    /// Whether this node believes itself the leader
    pub is_leader: bool,
    /// Whether this node is participating in the protocol
    pub is_available: bool,
}
