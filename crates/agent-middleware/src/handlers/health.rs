//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Liveness probe.
///
/// Always healthy: the agent being unavailable degrades reporting, not the
/// service.
///
/// ## Example Response
///
/// ```json
/// { "status": "healthy", "instrumentation_enabled": true }
/// ```
#[instrument(skip_all, name = "agent.middleware.health")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        instrumentation_enabled: state.instrumentation.is_enabled(),
    })
}
