//! Realtime WebSocket route

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;

/// `GET /ws/realtime` upgrades to a WebSocket relayed verbatim to the
/// upstream realtime API.
///
/// Messages flow unchanged in both directions. If the upstream cannot be
/// reached the client receives one message before the socket closes:
///
/// ```json
/// {"type": "error", "error": {"message": "Authentication failed: upstream returned 401 Unauthorized"}}
/// ```
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
