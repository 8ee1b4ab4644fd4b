//! HTTP service layer exposing the election engine

use crate::election::ElectionEngine;
use crate::error::ClusterError;
use crate::state::NodeStatus;
use crate::transport::{CoordinatorAnnouncement, ElectionRequest};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

impl IntoResponse for ClusterError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.is_unavailable() {
            // Distinct from a transport error so callers can tell an
            // intentionally-down node from a crashed one.
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the node's HTTP router
///
/// CORS is fully permissive: the cluster dashboard calls these
/// endpoints straight from the browser.
pub fn router(engine: Arc<ElectionEngine>) -> Router {
    Router::new()
        .route("/ping", post(ping))
        .route("/election", post(handle_election))
        .route("/coordinator", post(handle_coordinator))
        .route("/info", get(info))
        .route("/kill", post(kill))
        .route("/revive", post(revive))
        .route("/start-election", post(start_election))
        .with_state(engine)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

async fn ping(State(engine): State<Arc<ElectionEngine>>) -> Result<StatusCode, ClusterError> {
    engine.ping()?;
    Ok(StatusCode::OK)
}

async fn handle_election(
    State(engine): State<Arc<ElectionEngine>>,
    Json(request): Json<ElectionRequest>,
) -> Result<StatusCode, ClusterError> {
    engine.handle_election_request(request.candidate_id).await?;
    Ok(StatusCode::OK)
}

async fn handle_coordinator(
    State(engine): State<Arc<ElectionEngine>>,
    Json(announcement): Json<CoordinatorAnnouncement>,
) -> Result<StatusCode, ClusterError> {
    engine.handle_coordinator_announcement(announcement.leader_id)?;
    Ok(StatusCode::OK)
}

/// Always answers, even on a "down" node: orchestration and the
/// dashboard need to see a killed node's state.
async fn info(State(engine): State<Arc<ElectionEngine>>) -> Json<NodeStatus> {
    Json(engine.status())
}

async fn kill(State(engine): State<Arc<ElectionEngine>>) -> impl IntoResponse {
    engine.set_available(false).await;
    (
        StatusCode::OK,
        format!("Node {} is now simulating a failure", engine.self_id()),
    )
}

async fn revive(State(engine): State<Arc<ElectionEngine>>) -> impl IntoResponse {
    engine.set_available(true).await;
    (StatusCode::OK, format!("Node {} revived", engine.self_id()))
}

async fn start_election(
    State(engine): State<Arc<ElectionEngine>>,
) -> Result<(StatusCode, String), ClusterError> {
    engine.trigger_election().await?;
    Ok((StatusCode::OK, "Election started".to_string()))
}
