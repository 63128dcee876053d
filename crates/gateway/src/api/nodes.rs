//! Node and static-data REST endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /v1/nodes: list registered nodes (online and offline).
pub async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    let mut nodes = state.router.registry().list();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    Json(serde_json::json!({
        "nodes": nodes,
        "count": nodes.len(),
    }))
}

/// GET /v1/nodes/:id
pub async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.router.registry().get(&id) {
        Some(node) => Json(serde_json::json!(node)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("node not found: {id}") })),
        )
            .into_response(),
    }
}

/// GET /v1/static-data: merged static data of all online nodes.
pub async fn merged_static_data(State(state): State<AppState>) -> impl IntoResponse {
    let data = state.router.registry().merged_static_data();
    Json(serde_json::json!({
        "data": data,
        "count": data.len(),
    }))
}

/// GET /v1/static-data/:key
pub async fn static_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.router.registry().static_value(&key) {
        Some(value) => Json(serde_json::json!({ "key": key, "value": value })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no static data for key: {key}") })),
        )
            .into_response(),
    }
}
