use serde::Serialize;

/// Structured trace events emitted by the router.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    NodeRegistered {
        node_id: String,
        connection_id: String,
        tool_count: usize,
        is_new: bool,
    },
    NodeRemoved {
        node_id: String,
        tools_removed: usize,
    },
    NodeTimedOut {
        node_id: String,
        silent_ms: i64,
    },
    ToolOwnershipChanged {
        tool: String,
        from_node: String,
        to_node: String,
    },
    CallRouted {
        tool: String,
        node_id: String,
        call_id: String,
        outcome: String,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "th_event");
    }
}
