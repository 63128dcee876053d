pub mod hub;
pub mod nodes;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Hub
        .route("/v1/health", get(hub::health))
        .route("/v1/stats", get(hub::stats))
        .route("/v1/calls", get(hub::list_calls))
        .route("/v1/connections", get(hub::list_connections))
        // Nodes
        .route("/v1/nodes", get(nodes::list_nodes))
        .route("/v1/nodes/ws", get(crate::nodes::ws::node_ws))
        .route("/v1/nodes/:id", get(nodes::get_node))
        // Static data
        .route("/v1/static-data", get(nodes::merged_static_data))
        .route("/v1/static-data/:key", get(nodes::static_value))
        // Tools
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/tools/invoke", post(tools::invoke_tool))
}
