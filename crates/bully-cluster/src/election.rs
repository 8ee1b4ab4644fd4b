//! The Bully election engine

use crate::error::{ClusterError, Result};
use crate::registry::{NodeId, PeerRegistry};
use crate::state::{NodeState, NodeStatus};
use crate::transport::PeerTransport;
use std::sync::Arc;

/// Per-node election state machine
///
/// The engine is the single authority allowed to change the leader
/// belief or start an election. The heartbeat task and the inbound
/// protocol handlers all drive state through it; cross-node calls go
/// out through the [`PeerTransport`] and their failures are absorbed
/// into local state transitions, never propagated to callers. The only
/// error the public surface returns is [`ClusterError::Unavailable`].
pub struct ElectionEngine {
    self_id: NodeId,
    registry: Arc<PeerRegistry>,
    state: Arc<NodeState>,
    transport: Arc<dyn PeerTransport>,
}

impl ElectionEngine {
    pub fn new(
        self_id: NodeId,
        registry: Arc<PeerRegistry>,
        state: Arc<NodeState>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            self_id,
            registry,
            state,
            transport,
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn state(&self) -> &NodeState {
        self.state.as_ref()
    }

    /// Whether this node currently believes itself the leader
    pub fn is_leader(&self) -> bool {
        self.state.leader_raw() == self.self_id.raw()
    }

    /// Read-only snapshot of this node's state
    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.self_id,
            leader_id: self.state.leader_raw(),
            is_leader: self.is_leader(),
            is_available: self.state.is_available(),
        }
    }

    /// Liveness check of the inbound surface
    pub fn ping(&self) -> Result<()> {
        if !self.state.is_available() {
            return Err(ClusterError::Unavailable);
        }
        Ok(())
    }

    /// Establish the initial leader belief from the static registry
    ///
    /// The highest identifier, including self, is assumed leader. Run
    /// once at startup and again whenever the node transitions back to
    /// available. Ends with a concrete leader belief whenever the
    /// identifier set is non-empty.
    pub async fn determine_initial_leader(&self) {
        let max_id = self.registry.max_id(self.self_id);
        if max_id == self.self_id {
            self.become_leader().await;
        } else {
            self.state.set_leader(max_id);
            tracing::info!(
                "Node {} assuming node {} is the leader, verifying",
                self.self_id,
                max_id
            );
            self.check_leader_health().await;
        }
    }

    /// One heartbeat tick: probe the believed leader, re-elect on failure
    ///
    /// Skips entirely while this node is down or is itself the leader.
    pub async fn check_leader_health(&self) {
        if !self.state.is_available() || self.is_leader() {
            return;
        }

        let Some(leader) = self.state.leader() else {
            tracing::warn!("No known leader, starting election");
            self.start_election().await;
            return;
        };

        let Some(url) = self.registry.address(leader) else {
            tracing::error!("No address registered for leader {}, starting election", leader);
            self.state.clear_leader();
            self.start_election().await;
            return;
        };

        tracing::debug!("Probing leader {}", leader);
        if let Err(err) = self.transport.probe(url).await {
            tracing::warn!("Leader {} failed health probe: {}", leader, err);
            self.state.clear_leader();
            self.start_election().await;
        }
    }

    /// Start an election against all higher-ranked peers
    ///
    /// No-op while down, or while another self-initiated election holds
    /// the guard. The guard is released before returning: resolution of
    /// a dispatched election rests with the higher node's coordinator
    /// announcement, so the guard only prevents a thundering herd of
    /// simultaneous dispatches, not overlapping pending elections.
    pub async fn start_election(&self) {
        if !self.state.is_available() || !self.state.begin_election() {
            tracing::info!("Election already in progress or node is unavailable");
            return;
        }

        tracing::info!("Node {} starting an election", self.self_id);

        let higher_peers = self.registry.higher_than(self.self_id);
        if higher_peers.is_empty() {
            self.become_leader().await;
            return;
        }

        let mut anyone_responded = false;
        for (peer, url) in higher_peers {
            tracing::info!("Sending election request to node {}", peer);
            match self.transport.request_election(url, self.self_id).await {
                Ok(()) => anyone_responded = true,
                Err(err) => {
                    tracing::warn!("Node {} did not respond to election request: {}", peer, err);
                }
            }
        }

        if !anyone_responded {
            self.become_leader().await;
        }
        // Someone responded: await their coordinator announcement.
        self.state.end_election();
    }

    /// Handle an inbound election request from `candidate`
    ///
    /// A lower-ranked challenger is outranked: acknowledge and assert
    /// our own candidacy. A higher or equal candidate resolves the
    /// election on its own; we wait for its announcement.
    pub async fn handle_election_request(&self, candidate: NodeId) -> Result<()> {
        if !self.state.is_available() {
            return Err(ClusterError::Unavailable);
        }

        if candidate < self.self_id {
            tracing::info!(
                "Election request from lower-ranked node {}, starting own election",
                candidate
            );
            self.start_election().await;
        } else {
            tracing::info!(
                "Election request from higher-ranked node {}, awaiting announcement",
                candidate
            );
        }
        Ok(())
    }

    /// Handle an inbound coordinator announcement
    ///
    /// Last writer wins: there is no term numbering, so an announcement
    /// from a stale election can overwrite a fresher belief. The next
    /// heartbeat cycle corrects a wrong belief.
    pub fn handle_coordinator_announcement(&self, leader: NodeId) -> Result<()> {
        if !self.state.is_available() {
            return Err(ClusterError::Unavailable);
        }

        tracing::info!("Coordinator announcement received: new leader is node {}", leader);
        self.state.set_leader(leader);
        self.state.end_election();
        Ok(())
    }

    /// Self-promote and broadcast the result to every other peer
    ///
    /// Broadcast is best-effort: per-peer failures are logged and do
    /// not abort the remaining sends or revert leadership.
    async fn become_leader(&self) {
        if !self.state.is_available() {
            return;
        }

        tracing::info!("Node {} becoming the new leader", self.self_id);
        self.state.set_leader(self.self_id);
        self.state.end_election();

        for (peer, url) in self.registry.others(self.self_id) {
            tracing::info!("Announcing leadership to node {}", peer);
            if let Err(err) = self.transport.announce_coordinator(url, self.self_id).await {
                tracing::warn!("Failed to announce leadership to node {}: {}", peer, err);
            }
        }
    }

    /// Administrative availability toggle for failure injection
    ///
    /// A revived node re-runs initial leader determination instead of
    /// trusting its stale local belief.
    pub async fn set_available(&self, flag: bool) {
        let was_available = self.state.set_available(flag);
        tracing::info!("Node {} availability set to {}", self.self_id, flag);

        if flag && !was_available {
            self.determine_initial_leader().await;
        }
    }

    /// Manual election start; reports `Unavailable` instead of
    /// silently doing nothing so callers can tell a rejected trigger
    /// from a started one
    pub async fn trigger_election(&self) -> Result<()> {
        if !self.state.is_available() {
            return Err(ClusterError::Unavailable);
        }
        self.start_election().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// Records every outbound call and fails those aimed at peers
    /// marked unreachable.
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
        unreachable: Mutex<HashSet<String>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(vec![]),
                unreachable: Mutex::new(HashSet::new()),
            })
        }

        fn mark_unreachable(&self, base_url: &str) {
            self.unreachable.lock().unwrap().insert(base_url.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, base_url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.unreachable.lock().unwrap().contains(base_url) {
                return Err(ClusterError::peer_unreachable(base_url.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn probe(&self, base_url: &str) -> Result<()> {
            self.record(format!("probe {}", base_url), base_url)
        }

        async fn request_election(&self, base_url: &str, candidate: NodeId) -> Result<()> {
            self.record(format!("election {} from {}", base_url, candidate), base_url)
        }

        async fn announce_coordinator(&self, base_url: &str, leader: NodeId) -> Result<()> {
            self.record(format!("coordinator {} leader {}", base_url, leader), base_url)
        }
    }

    fn url(id: i64) -> String {
        format!("http://node{}:8080", id)
    }

    fn engine(self_id: i64, peer_ids: &[i64], transport: Arc<RecordingTransport>) -> ElectionEngine {
        let peers: BTreeMap<NodeId, String> = peer_ids
            .iter()
            .map(|id| (NodeId::new(*id), url(*id)))
            .collect();
        ElectionEngine::new(
            NodeId::new(self_id),
            Arc::new(PeerRegistry::new(peers)),
            Arc::new(NodeState::new()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_highest_node_self_promotes_and_announces() {
        let transport = RecordingTransport::new();
        let node3 = engine(3, &[1, 2], transport.clone());

        node3.determine_initial_leader().await;

        assert!(node3.is_leader());
        assert_eq!(node3.state().leader(), Some(NodeId::new(3)));
        assert_eq!(
            transport.calls(),
            vec![
                format!("coordinator {} leader 3", url(1)),
                format!("coordinator {} leader 3", url(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_lower_node_assumes_max_and_probes() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.determine_initial_leader().await;

        assert!(!node1.is_leader());
        assert_eq!(node1.state().leader(), Some(NodeId::new(3)));
        assert_eq!(transport.calls(), vec![format!("probe {}", url(3))]);
    }

    #[tokio::test]
    async fn test_initial_determination_elects_when_assumed_leader_is_dead() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(&url(3));
        let node2 = engine(2, &[1, 3], transport.clone());

        node2.determine_initial_leader().await;

        // Probe of node 3 fails, the election request to it fails too,
        // so node 2 promotes itself and announces to both peers.
        assert!(node2.is_leader());
        let calls = transport.calls();
        assert!(calls.contains(&format!("probe {}", url(3))));
        assert!(calls.contains(&format!("election {} from 2", url(3))));
        assert!(calls.contains(&format!("coordinator {} leader 2", url(1))));
    }

    #[tokio::test]
    async fn test_election_with_no_higher_peers_self_promotes() {
        let transport = RecordingTransport::new();
        let node3 = engine(3, &[1, 2], transport.clone());

        node3.start_election().await;

        assert!(node3.is_leader());
        assert!(!node3.state().election_in_progress());
    }

    #[tokio::test]
    async fn test_election_with_responsive_higher_peer_defers() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.start_election().await;

        // A higher peer acknowledged the request: resolution is left to
        // its coordinator announcement, and the guard is released.
        assert!(!node1.is_leader());
        assert_eq!(node1.state().leader(), None);
        assert!(!node1.state().election_in_progress());
        assert_eq!(
            transport.calls(),
            vec![
                format!("election {} from 1", url(2)),
                format!("election {} from 1", url(3)),
            ]
        );
    }

    #[tokio::test]
    async fn test_election_with_unresponsive_higher_peers_self_promotes() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(&url(2));
        transport.mark_unreachable(&url(3));
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.start_election().await;

        assert!(node1.is_leader());
        assert!(!node1.state().election_in_progress());
    }

    #[tokio::test]
    async fn test_election_noop_while_down() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        node1.state().set_available(false);

        node1.start_election().await;

        assert!(transport.calls().is_empty());
        assert_eq!(node1.state().leader(), None);
    }

    #[tokio::test]
    async fn test_election_request_from_lower_candidate_triggers_election() {
        let transport = RecordingTransport::new();
        let node2 = engine(2, &[1, 3], transport.clone());

        node2.handle_election_request(NodeId::new(1)).await.unwrap();

        // Node 2 bullies the challenger by asserting its own candidacy.
        assert_eq!(
            transport.calls(),
            vec![format!("election {} from 2", url(3))]
        );
    }

    #[tokio::test]
    async fn test_election_request_from_higher_candidate_is_deferred() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.handle_election_request(NodeId::new(3)).await.unwrap();

        assert!(transport.calls().is_empty());
        assert_eq!(node1.state().leader(), None);
        assert!(!node1.state().election_in_progress());
    }

    #[tokio::test]
    async fn test_handlers_reject_while_down() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        node1.state().set_available(false);

        assert!(matches!(node1.ping(), Err(ClusterError::Unavailable)));
        assert!(matches!(
            node1.handle_election_request(NodeId::new(2)).await,
            Err(ClusterError::Unavailable)
        ));
        assert!(matches!(
            node1.handle_coordinator_announcement(NodeId::new(3)),
            Err(ClusterError::Unavailable)
        ));
        assert!(matches!(
            node1.trigger_election().await,
            Err(ClusterError::Unavailable)
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_coordinator_announcement_updates_belief() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        assert!(node1.state().begin_election());

        node1.handle_coordinator_announcement(NodeId::new(3)).unwrap();

        assert_eq!(node1.state().leader(), Some(NodeId::new(3)));
        assert!(!node1.state().election_in_progress());
    }

    #[tokio::test]
    async fn test_announcement_is_last_writer_wins() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.handle_coordinator_announcement(NodeId::new(3)).unwrap();
        node1.handle_coordinator_announcement(NodeId::new(2)).unwrap();

        assert_eq!(node1.state().leader(), Some(NodeId::new(2)));
    }

    #[tokio::test]
    async fn test_heartbeat_skips_while_down() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        node1.state().set_leader(NodeId::new(3));
        node1.state().set_available(false);

        node1.check_leader_health().await;

        assert!(transport.calls().is_empty());
        // The stale belief is kept, not discarded.
        assert_eq!(node1.state().leader(), Some(NodeId::new(3)));
    }

    #[tokio::test]
    async fn test_leader_performs_no_network_calls_on_tick() {
        let transport = RecordingTransport::new();
        let node3 = engine(3, &[1, 2], transport.clone());
        node3.state().set_leader(NodeId::new(3));

        node3.check_leader_health().await;

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_elects_when_no_leader_known() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(&url(3));
        let node2 = engine(2, &[1, 3], transport.clone());

        node2.check_leader_health().await;

        assert!(node2.is_leader());
    }

    #[tokio::test]
    async fn test_heartbeat_failure_invalidates_leader_and_elects() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(&url(3));
        let node2 = engine(2, &[1, 3], transport.clone());
        node2.state().set_leader(NodeId::new(3));

        node2.check_leader_health().await;

        // Probe fails, node 3 also ignores the election request, so
        // node 2 takes over.
        assert!(node2.is_leader());
        assert!(transport.calls().contains(&format!("probe {}", url(3))));
    }

    #[tokio::test]
    async fn test_heartbeat_success_changes_nothing() {
        let transport = RecordingTransport::new();
        let node2 = engine(2, &[1, 3], transport.clone());
        node2.state().set_leader(NodeId::new(3));

        node2.check_leader_health().await;

        assert_eq!(node2.state().leader(), Some(NodeId::new(3)));
        assert_eq!(transport.calls(), vec![format!("probe {}", url(3))]);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_leader_address_is_treated_as_failure() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(&url(3));
        let node2 = engine(2, &[1, 3], transport.clone());
        // Believed leader 9 is not in the registry at all.
        node2.state().set_leader(NodeId::new(9));

        node2.check_leader_health().await;

        assert!(node2.is_leader());
    }

    #[tokio::test]
    async fn test_revival_reruns_initial_determination() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        node1.set_available(false).await;
        assert_eq!(node1.state().leader(), None);

        node1.set_available(true).await;

        assert_eq!(node1.state().leader(), Some(NodeId::new(3)));
        assert!(node1.state().is_available());
    }

    #[tokio::test]
    async fn test_setting_available_twice_does_not_redetermine() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());

        node1.set_available(true).await;

        // Already available: no transition, no probe of node 3.
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_converge_on_self_promotion() {
        let transport = RecordingTransport::new();
        let node3 = Arc::new(engine(3, &[1, 2], transport.clone()));

        let mut handles = vec![];
        for _ in 0..4 {
            let node = node3.clone();
            handles.push(tokio::spawn(async move { node.trigger_election().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(node3.is_leader());
        assert!(!node3.state().election_in_progress());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let transport = RecordingTransport::new();
        let node1 = engine(1, &[2, 3], transport.clone());
        node1.handle_coordinator_announcement(NodeId::new(3)).unwrap();

        let status = node1.status();
        assert_eq!(status.node_id, NodeId::new(1));
        assert_eq!(status.leader_id, 3);
        assert!(!status.is_leader);
        assert!(status.is_available);
    }
}
