use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};

use crate::core::latency::{LatencyEventKind, TurnSnapshot};
use crate::errors::AppResult;
use crate::state::AppState;

/// Event kinds surfaced by the latency stats endpoint.
const STATS_EVENT_KINDS: [LatencyEventKind; 2] =
    [LatencyEventKind::FirstAudio, LatencyEventKind::ResponseDone];

#[derive(Debug, Serialize)]
pub struct LatencyStatsResponse {
    pub stats: Vec<String>,
    pub log_file: String,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<TurnSnapshot>,
}

/// Liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Recent first-audio and response-done records from the latency log.
pub async fn latency_stats(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<LatencyStatsResponse>> {
    let lines = state
        .latency_log
        .tail(state.config.latency_stats_tail)
        .await?;

    let stats = lines
        .into_iter()
        .filter(|line| {
            STATS_EVENT_KINDS
                .iter()
                .any(|kind| line.contains(kind.as_str()))
        })
        .collect();

    Ok(Json(LatencyStatsResponse {
        stats,
        log_file: state.latency_log.path().display().to_string(),
    }))
}

/// Live sessions and their current turn counters.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.registry.snapshots();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}
