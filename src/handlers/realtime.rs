//! Realtime WebSocket handler
//!
//! Each upgraded browser connection becomes one relay session with its own
//! upstream connection. The handler performs no protocol translation.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::{debug, info};

use crate::core::bridge::WebSocketClient;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Upgrade the request and relay the socket to the upstream realtime API.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Realtime WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_realtime_socket(socket, state))
}

async fn handle_realtime_socket(socket: WebSocket, state: Arc<AppState>) {
    let client = WebSocketClient::split(socket);
    let outcome = state.relay.run(client, state.upstream.as_ref()).await;

    debug!(
        session_id = %outcome.session_id,
        upstream_connected = outcome.upstream_connected,
        client_to_upstream = ?outcome.client_to_upstream,
        upstream_to_client = ?outcome.upstream_to_client,
        "Realtime session finished"
    );
}
