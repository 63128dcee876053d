//! Tools API endpoints.
//!
//! - `GET  /v1/tools`       : every routable tool and its owning node
//! - `POST /v1/tools/invoke`: route one call through the hub

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::nodes::router::InvokeOptions;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.router.registry().tools();
    Json(serde_json::json!({
        "tools": tools,
        "count": tools.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tools/invoke
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request body for tool invocation.
#[derive(Debug, Deserialize)]
pub struct ToolInvokeRequest {
    /// Tool name (e.g. `"translate"`).
    pub tool: String,
    /// Opaque parameters forwarded to the node.
    #[serde(default, alias = "args")]
    pub params: serde_json::Value,
    /// Overrides `router.call_timeout_ms` for this call.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Always returns 200 with `ok: true/false` in the body; routing failures
/// are reported as `error.kind`.
pub async fn invoke_tool(
    State(state): State<AppState>,
    Json(req): Json<ToolInvokeRequest>,
) -> impl IntoResponse {
    let start = Instant::now();
    let opts = InvokeOptions {
        timeout: req.timeout_ms.map(Duration::from_millis),
        cancel: Some(state.shutdown.child_token()),
    };

    let outcome = state.router.invoke_with(&req.tool, req.params, opts).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(result) => Json(serde_json::json!({
            "ok": true,
            "tool": req.tool,
            "result": result,
            "duration_ms": duration_ms,
        })),
        Err(e) => Json(serde_json::json!({
            "ok": false,
            "tool": req.tool,
            "error": {
                "kind": e.kind(),
                "message": e.to_string(),
            },
            "duration_ms": duration_ms,
        })),
    }
}
