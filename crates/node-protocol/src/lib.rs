//! Node protocol: WebSocket message types exchanged between the hub and
//! tool-server nodes.
//!
//! Nodes are remote processes that register the tools and static data they
//! provide, keep themselves alive with heartbeats, and execute `call`
//! messages routed to them by the hub.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Node → Hub: announce (or re-announce) a node and its tools.
    ///
    /// `node_id` may be omitted; the hub then assigns one and returns it in
    /// `register_ack`.
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        /// Omitted on re-registration to keep the previously advertised list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tools: Option<Vec<ToolDescriptor>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        static_data: Option<HashMap<String, String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    /// Node → Hub: leave the hub; all of the node's tools stop routing.
    Unregister { node_id: String },

    /// Node → Hub: replace the advertised tool list.
    ToolListUpdate {
        node_id: String,
        tools: Vec<ToolDescriptor>,
    },

    /// Node → Hub: replace the node's published static data.
    StaticDataUpdate {
        node_id: String,
        data: HashMap<String, String>,
    },

    /// Node → Hub: liveness signal.
    Heartbeat { node_id: String },

    /// Hub → Node: execute a tool.
    Call {
        call_id: String,
        tool_name: String,
        #[serde(default)]
        params: serde_json::Value,
    },

    /// Node → Hub: outcome of a `call`.
    CallResult {
        call_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// Hub → Node: answer to `register`.
    RegisterAck {
        success: bool,
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Hub → Observers: node lifecycle notification.
    NodeEvent {
        event: NodeEventKind,
        node_id: String,
        display_name: String,
        status: NodeStatus,
        tool_count: usize,
    },
}

impl WsMessage {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            WsMessage::Register { .. } => "register",
            WsMessage::Unregister { .. } => "unregister",
            WsMessage::ToolListUpdate { .. } => "tool_list_update",
            WsMessage::StaticDataUpdate { .. } => "static_data_update",
            WsMessage::Heartbeat { .. } => "heartbeat",
            WsMessage::Call { .. } => "call",
            WsMessage::CallResult { .. } => "call_result",
            WsMessage::RegisterAck { .. } => "register_ack",
            WsMessage::NodeEvent { .. } => "node_event",
        }
    }
}

/// A tool advertised by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Globally routable name (e.g. `"translate"`).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Optional JSON Schema for the tool's parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<serde_json::Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: None,
        }
    }
}

/// Liveness state of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => f.write_str("online"),
            NodeStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Node lifecycle notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeEventKind {
    NodeOnline,
    NodeOffline,
    NodeTimeout,
    ToolsUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_parses_with_minimal_fields() {
        let raw = r#"{"type":"register","tools":[{"name":"translate"}]}"#;
        let msg: WsMessage = serde_json::from_str(raw).unwrap();
        match msg {
            WsMessage::Register {
                node_id,
                tools,
                static_data,
                ..
            } => {
                assert!(node_id.is_none());
                assert!(static_data.is_none());
                let tools = tools.unwrap();
                assert_eq!(tools.len(), 1);
                assert_eq!(tools[0].name, "translate");
                assert_eq!(tools[0].description, "");
            }
            other => panic!("expected Register, got {other:?}"),
        }
    }

    #[test]
    fn call_result_omits_absent_fields() {
        let msg = WsMessage::CallResult {
            call_id: "c1".into(),
            success: true,
            output: Some(serde_json::json!("hola")),
            data: None,
            error: None,
            duration_ms: None,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "call_result");
        assert_eq!(v["output"], "hola");
        assert!(v.get("error").is_none());
        assert!(v.get("data").is_none());
    }

    #[test]
    fn node_event_uses_snake_case_enums() {
        let msg = WsMessage::NodeEvent {
            event: NodeEventKind::NodeTimeout,
            node_id: "n1".into(),
            display_name: "Node 1".into(),
            status: NodeStatus::Offline,
            tool_count: 2,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "node_event");
        assert_eq!(v["event"], "node_timeout");
        assert_eq!(v["status"], "offline");
        assert_eq!(msg.kind(), "node_event");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"tool_request","request_id":"x"}"#;
        assert!(serde_json::from_str::<WsMessage>(raw).is_err());
    }
}
