//! Cross-node communication: wire payloads and the peer transport client

use crate::error::{ClusterError, Result};
use crate::registry::NodeId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload of an election request sent to higher-ranked peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRequest {
    pub candidate_id: NodeId,
}

/// Payload broadcast by a newly self-promoted leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorAnnouncement {
    pub leader_id: NodeId,
}

/// Request/response transport for the three protocol verbs
///
/// Every call targets a peer base URL resolved from the registry and
/// carries a bounded timeout; any timeout, refusal or non-success
/// response is an error. Callers treat failures as "peer did not
/// respond" and never propagate them outward.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Leader liveness check, no payload
    async fn probe(&self, base_url: &str) -> Result<()>;

    /// Notify a higher-ranked peer that an election is underway
    async fn request_election(&self, base_url: &str, candidate: NodeId) -> Result<()>;

    /// Inform a peer of the election result
    async fn announce_coordinator(&self, base_url: &str, leader: NodeId) -> Result<()>;
}

/// HTTP transport posting to the peer's service endpoints
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    /// Build a transport whose every request times out after `timeout`
    ///
    /// The timeout must be short relative to the heartbeat period so an
    /// unreachable peer cannot stall a health check or a broadcast.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClusterError::configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn post_json<T: Serialize + Sync>(&self, url: String, body: &T) -> Result<()> {
        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(ClusterError::peer_unreachable(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn probe(&self, base_url: &str) -> Result<()> {
        let url = format!("{}/ping", base_url);
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(ClusterError::peer_unreachable(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn request_election(&self, base_url: &str, candidate: NodeId) -> Result<()> {
        self.post_json(
            format!("{}/election", base_url),
            &ElectionRequest {
                candidate_id: candidate,
            },
        )
        .await
    }

    async fn announce_coordinator(&self, base_url: &str, leader: NodeId) -> Result<()> {
        self.post_json(
            format!("{}/coordinator", base_url),
            &CoordinatorAnnouncement { leader_id: leader },
        )
        .await
    }
}
