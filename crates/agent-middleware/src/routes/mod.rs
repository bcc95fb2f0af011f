//! HTTP routes for the demonstration service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::{AgentLayer, Instrumentation};
use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request instrumentation shared by every request.
    pub instrumentation: Arc<Instrumentation>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/api/values/get` and `/api/values/get/:id` - instrumented API routes
/// - instrumented 404 fallback for every unmatched path
/// - `/health` - Liveness probe (not instrumented)
/// - `/metrics` - Prometheus metrics (not instrumented)
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/api/values/get", get(handlers::list_values))
        .route("/api/values/get/:id", get(handlers::get_value))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(AgentLayer::new(state.instrumentation.clone()));

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (outermost)
    // 2. TraceLayer - Log request details
    api_routes
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
