//! Fan-out of node lifecycle events to interested listeners.

use serde::Serialize;
use th_protocol::{NodeEventKind, NodeStatus, WsMessage};
use tokio::sync::broadcast;

/// Payload published for every node lifecycle change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub node_id: String,
    pub display_name: String,
    pub status: NodeStatus,
    pub tool_count: usize,
}

impl NodeEvent {
    pub fn to_message(&self) -> WsMessage {
        WsMessage::NodeEvent {
            event: self.kind,
            node_id: self.node_id.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
            tool_count: self.tool_count,
        }
    }
}

pub struct ChangeNotifier {
    tx: broadcast::Sender<NodeEvent>,
    enabled: bool,
}

impl ChangeNotifier {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: NodeEvent) {
        tracing::debug!(
            node_id = %event.node_id,
            kind = ?event.kind,
            status = %event.status,
            tool_count = event.tool_count,
            "node event"
        );
        if !self.enabled {
            return;
        }
        let _ = self.tx.send(event);
    }
}
