//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::AgentError;
use crate::server::handlers::{
    decline_gate_handler, gates_handler, health_handler, push_handler, reconcile_handler,
    reset_gate_handler, reset_identity_handler, resume_gates_handler, retry_handler, skip_handler,
    status_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the operator API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Reconciliation
        .route("/status", get(status_handler))
        .route("/reconcile", post(reconcile_handler))
        .route("/push", post(push_handler))
        // Blocked provisioning items
        .route("/provisioning/retry", post(retry_handler))
        .route("/provisioning/skip", post(skip_handler))
        // Gates
        .route("/gates", get(gates_handler))
        .route("/gates/resume", post(resume_gates_handler))
        .route("/gates/{gate}/decline", post(decline_gate_handler))
        .route("/gates/{gate}/reset", post(reset_gate_handler))
        // Identity
        .route("/identity/reset", post(reset_identity_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AgentError>>, AgentError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AgentError::ServerError(e.to_string()))
    });

    Ok(handle)
}
