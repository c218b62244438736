use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;

/// Health, latency stats and session introspection routes.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/api/latency-stats", get(api::latency_stats))
        .route("/api/sessions", get(api::list_sessions))
        .layer(TraceLayer::new_for_http())
}
