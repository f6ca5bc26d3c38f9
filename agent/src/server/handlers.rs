//! HTTP request handlers

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::AgentError;
use crate::gates::{GateId, GateReport};
use crate::platform::notify::StatusSnapshot;
use crate::reconcile::{OrchestratorStatus, PassOutcome, Resolution};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps agent errors to HTTP status codes
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::GateDenied(_) | AgentError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "mdmagent".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub server: String,
    pub reconcile: OrchestratorStatus,
    pub display: StatusSnapshot,
}

/// Status handler
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let identity = state.orchestrator.prefs().identity().await;
    Json(StatusResponse {
        device_id: identity.device_id,
        server: identity.base_url,
        reconcile: state.orchestrator.status().await,
        display: state.status_board.snapshot(),
    })
}

/// Reconcile query
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    /// Do not fall back to the cached configuration
    #[serde(default)]
    pub force: bool,
}

/// Run a pass on its own task and wait for it.
///
/// A client hanging up drops only the wait, the pass itself runs to the end.
async fn run_detached<F>(pass: F) -> Result<Json<PassOutcome>, ApiError>
where
    F: Future<Output = Result<PassOutcome, AgentError>> + Send + 'static,
{
    let outcome = tokio::spawn(pass)
        .await
        .map_err(|e| AgentError::Internal(format!("reconciliation task failed: {}", e)))??;
    Ok(Json(outcome))
}

/// Operator refresh: run a pass and report how it ended
pub async fn reconcile_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<PassOutcome>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let force = query.force;
    run_detached(async move { orchestrator.trigger(force).await }).await
}

/// Accepted response for background passes
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Server push: start a pass in the background
pub async fn push_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.clone();
    let accepted = !orchestrator.is_reconciling();
    if accepted {
        tokio::spawn(async move {
            if let Err(e) = orchestrator.trigger(false).await {
                error!("Push triggered reconciliation failed: {}", e);
            }
        });
    }
    (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted }))
}

/// Retry the blocked provisioning item
pub async fn retry_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<PassOutcome>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    run_detached(async move { orchestrator.resolve(Resolution::Retry).await }).await
}

/// Skip the blocked provisioning item
pub async fn skip_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<PassOutcome>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    run_detached(async move { orchestrator.resolve(Resolution::Skip).await }).await
}

/// Gate states
pub async fn gates_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<GateReport>> {
    Json(state.orchestrator.gates().report().await)
}

/// Re-evaluate gates after the operator acted on the device
pub async fn resume_gates_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<PassOutcome>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    run_detached(async move { orchestrator.trigger(false).await }).await
}

fn parse_gate(gate: &str) -> Result<GateId, ApiError> {
    gate.parse()
        .map_err(|e: String| ApiError(AgentError::NotFound(e)))
}

/// Decline an optional gate and continue
pub async fn decline_gate_handler(
    State(state): State<Arc<ServerState>>,
    Path(gate): Path<String>,
) -> Result<Json<PassOutcome>, ApiError> {
    let gate = parse_gate(&gate)?;
    state.orchestrator.gates().decline(gate).await?;
    let orchestrator = state.orchestrator.clone();
    run_detached(async move { orchestrator.trigger(false).await }).await
}

/// Forget a gate resolution so it is asked again
pub async fn reset_gate_handler(
    State(state): State<Arc<ServerState>>,
    Path(gate): Path<String>,
) -> Result<Json<Vec<GateReport>>, ApiError> {
    let gate = parse_gate(&gate)?;
    state.orchestrator.gates().reset(gate).await?;
    Ok(Json(state.orchestrator.gates().report().await))
}

/// Forget the device identity
pub async fn reset_identity_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.reset_identity().await?;
    Ok(StatusCode::NO_CONTENT)
}
