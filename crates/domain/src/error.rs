/// Caller-visible failure of a routed tool call.
///
/// `invoke` hands these back as values; nothing on the routing path panics
/// or propagates a node's misbehaviour into the hub.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No node has registered this tool, or its owner unregistered.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The tool is indexed but its owning node is offline or gone.
    #[error("node {node_id} unavailable for tool {tool}")]
    NodeUnavailable { tool: String, node_id: String },

    /// No result arrived before the call's deadline.
    #[error("call to {tool} timed out after {elapsed_ms}ms")]
    CallTimeout { tool: String, elapsed_ms: u64 },

    /// No transport has been attached to the router.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// The transport refused the outbound call message.
    #[error("failed to send call to node {node_id}: {message}")]
    SendFailed { node_id: String, message: String },

    /// Too many calls already in flight.
    #[error("pending limit reached: {message}")]
    PendingLimit { message: String },

    /// The caller gave up before a result arrived.
    #[error("call cancelled: {reason}")]
    Cancelled { reason: String },

    /// The router is shutting down.
    #[error("router shutting down: {reason}")]
    Shutdown { reason: String },
}

impl RouteError {
    /// Stable snake_case identifier used on the wire and in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::ToolNotFound { .. } => "tool_not_found",
            RouteError::NodeUnavailable { .. } => "node_unavailable",
            RouteError::CallTimeout { .. } => "call_timeout",
            RouteError::TransportUnavailable => "transport_unavailable",
            RouteError::SendFailed { .. } => "send_failed",
            RouteError::PendingLimit { .. } => "pending_limit",
            RouteError::Cancelled { .. } => "cancelled",
            RouteError::Shutdown { .. } => "shutdown",
        }
    }
}
