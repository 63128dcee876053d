//! Core types for tool handling: context, results, and errors.

use tokio_util::sync::CancellationToken;

/// Context provided to every tool handler invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Correlation ID; echoed back in the `call_result`.
    pub call_id: String,
    /// Tool name exactly as the hub sent it.
    pub tool_name: String,
    /// Cancelled when the connection drops or the node shuts down.
    pub cancel: CancellationToken,
}

/// Result type for tool handlers.
pub type ToolResult = Result<serde_json::Value, ToolError>;

/// Errors a tool handler can return.
///
/// The SDK turns these into a `call_result` with `success: false` and the
/// rendered error in the `error` field.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ToolError {
    #[error("invalid_args: {0}")]
    InvalidArgs(String),
    #[error("not_allowed: {0}")]
    NotAllowed(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("not_found: {0}")]
    NotFound(String),
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum NodeSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("registration: {0}")]
    Registration(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
