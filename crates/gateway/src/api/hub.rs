//! Hub-level introspection endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /v1/stats: node, tool, pending-call, and connection counts.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.router.stats();
    Json(serde_json::json!({
        "nodes_total": stats.nodes_total,
        "nodes_online": stats.nodes_online,
        "nodes_offline": stats.nodes_offline,
        "tools_total": stats.tools_total,
        "pending_calls": stats.pending_calls,
        "connections": state.hub.len(),
    }))
}

/// GET /v1/calls: in-flight calls, oldest first.
pub async fn list_calls(State(state): State<AppState>) -> impl IntoResponse {
    let calls = state.router.pending_calls();
    Json(serde_json::json!({
        "calls": calls,
        "count": calls.len(),
    }))
}

/// GET /v1/connections
pub async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.hub.list();
    Json(serde_json::json!({
        "connections": connections,
        "count": connections.len(),
    }))
}
