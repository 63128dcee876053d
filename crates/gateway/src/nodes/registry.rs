//! In-memory registry of tool-server nodes, their tools, and static data.
//!
//! The registry owns the [`ToolIndex`]; both live behind one lock so a node
//! and its routing entries always change together.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use th_domain::trace::TraceEvent;
use th_protocol::{NodeEventKind, NodeStatus, ToolDescriptor};

use super::index::ToolIndex;
use super::notifier::{ChangeNotifier, NodeEvent};

/// A registered node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub display_name: String,
    pub endpoint: Option<String>,
    /// Transport address; may change across reconnects while `id` stays.
    pub connection_id: String,
    pub tools: Vec<ToolDescriptor>,
    pub static_data: HashMap<String, String>,
    pub metadata: Option<serde_json::Value>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub status: NodeStatus,
}

impl Node {
    fn event(&self, kind: NodeEventKind) -> NodeEvent {
        NodeEvent {
            kind,
            node_id: self.id.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
            tool_count: self.tools.len(),
        }
    }
}

/// Fields carried by a `register` message.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub node_id: String,
    pub connection_id: String,
    pub display_name: Option<String>,
    pub endpoint: Option<String>,
    /// `None` keeps the previously advertised list on re-registration.
    pub tools: Option<Vec<ToolDescriptor>>,
    /// Merged into existing static data; keys not mentioned survive.
    pub static_data: Option<HashMap<String, String>>,
    pub metadata: Option<serde_json::Value>,
}

/// Where a tool call should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Nothing indexes this tool.
    NotFound,
    /// Indexed, but the owner is offline (or vanished mid-lookup).
    Unavailable { node_id: String },
    Ready {
        node_id: String,
        connection_id: String,
    },
}

/// A routable tool as seen from the hub.
#[derive(Debug, Clone, Serialize)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_schema: Option<serde_json::Value>,
    pub node_id: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCounts {
    pub nodes_total: usize,
    pub nodes_online: usize,
    pub tools_total: usize,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    index: ToolIndex,
}

/// Thread-safe registry of all known nodes.
pub struct NodeRegistry {
    inner: RwLock<Inner>,
    notifier: Arc<ChangeNotifier>,
}

impl NodeRegistry {
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            notifier,
        }
    }

    /// Insert or refresh a node. Always leaves it `online`.
    pub fn register(&self, reg: Registration) -> Node {
        let now = Utc::now();
        let mut takeovers = Vec::new();

        let (snapshot, is_new) = {
            let mut inner = self.inner.write();
            let Inner { nodes, index } = &mut *inner;

            let is_new = !nodes.contains_key(&reg.node_id);
            let node = nodes.entry(reg.node_id.clone()).or_insert_with(|| Node {
                id: reg.node_id.clone(),
                display_name: reg.node_id.clone(),
                endpoint: None,
                connection_id: reg.connection_id.clone(),
                tools: Vec::new(),
                static_data: HashMap::new(),
                metadata: None,
                registered_at: now,
                last_heartbeat_at: now,
                status: NodeStatus::Online,
            });

            node.connection_id = reg.connection_id;
            if let Some(name) = reg.display_name {
                node.display_name = name;
            }
            if reg.endpoint.is_some() {
                node.endpoint = reg.endpoint;
            }
            if reg.metadata.is_some() {
                node.metadata = reg.metadata;
            }
            if let Some(data) = reg.static_data {
                node.static_data.extend(data);
            }
            node.status = NodeStatus::Online;
            node.last_heartbeat_at = now;

            if let Some(tools) = reg.tools {
                let old = std::mem::replace(&mut node.tools, tools);
                reindex(index, &node.id, &old, &node.tools, &mut takeovers);
            }

            (node.clone(), is_new)
        };

        report_takeovers(&snapshot.id, takeovers);

        tracing::info!(
            node_id = %snapshot.id,
            connection_id = %snapshot.connection_id,
            tools = snapshot.tools.len(),
            is_new,
            "node registered"
        );
        TraceEvent::NodeRegistered {
            node_id: snapshot.id.clone(),
            connection_id: snapshot.connection_id.clone(),
            tool_count: snapshot.tools.len(),
            is_new,
        }
        .emit();
        self.notifier.publish(snapshot.event(NodeEventKind::NodeOnline));

        snapshot
    }

    /// Remove a node and every routing entry it owns.
    pub fn unregister(&self, node_id: &str) -> Option<Node> {
        let removed = {
            let mut inner = self.inner.write();
            inner.nodes.remove(node_id).map(|node| {
                let tools_removed = inner.index.remove_node(node_id);
                (node, tools_removed)
            })
        };
        let Some((mut node, tools_removed)) = removed else {
            tracing::warn!(node_id = %node_id, "unregister for unknown node ignored");
            return None;
        };

        node.status = NodeStatus::Offline;
        tracing::info!(node_id = %node_id, tools_removed, "node unregistered");
        TraceEvent::NodeRemoved {
            node_id: node_id.to_string(),
            tools_removed,
        }
        .emit();
        self.notifier.publish(node.event(NodeEventKind::NodeOffline));
        Some(node)
    }

    /// Replace a node's tool list, re-pointing the index.
    pub fn update_tools(&self, node_id: &str, tools: Vec<ToolDescriptor>) -> bool {
        let mut takeovers = Vec::new();
        let event = {
            let mut inner = self.inner.write();
            let Inner { nodes, index } = &mut *inner;
            let Some(node) = nodes.get_mut(node_id) else {
                tracing::warn!(node_id = %node_id, "tool_list_update for unknown node ignored");
                return false;
            };
            let old = std::mem::replace(&mut node.tools, tools);
            reindex(index, node_id, &old, &node.tools, &mut takeovers);
            node.event(NodeEventKind::ToolsUpdated)
        };

        report_takeovers(node_id, takeovers);
        tracing::info!(node_id = %node_id, tools = event.tool_count, "node tools updated");
        self.notifier.publish(event);
        true
    }

    /// Replace a node's static data wholesale.
    pub fn update_static_data(&self, node_id: &str, data: HashMap<String, String>) -> bool {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(node_id) {
            Some(node) => {
                node.static_data = data;
                tracing::debug!(node_id = %node_id, keys = node.static_data.len(), "static data replaced");
                true
            }
            None => {
                tracing::warn!(node_id = %node_id, "static_data_update for unknown node ignored");
                false
            }
        }
    }

    /// Record a heartbeat. An offline node comes back online.
    pub fn touch_heartbeat(&self, node_id: &str) -> bool {
        let recovered = {
            let mut inner = self.inner.write();
            let Some(node) = inner.nodes.get_mut(node_id) else {
                tracing::warn!(node_id = %node_id, "heartbeat from unknown node ignored");
                return false;
            };
            node.last_heartbeat_at = Utc::now();
            if node.status == NodeStatus::Offline {
                node.status = NodeStatus::Online;
                Some(node.event(NodeEventKind::NodeOnline))
            } else {
                None
            }
        };

        if let Some(event) = recovered {
            tracing::info!(node_id = %node_id, "node recovered via heartbeat");
            self.notifier.publish(event);
        }
        true
    }

    /// Mark every online node silent for longer than `timeout` as offline.
    ///
    /// Records and index entries stay. Returns the ids that were demoted.
    pub fn sweep_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<String> {
        let expired: Vec<(NodeEvent, i64)> = {
            let mut inner = self.inner.write();
            inner
                .nodes
                .values_mut()
                .filter(|n| n.status == NodeStatus::Online)
                .filter_map(|n| {
                    let silent = now.signed_duration_since(n.last_heartbeat_at);
                    if silent > timeout {
                        n.status = NodeStatus::Offline;
                        Some((n.event(NodeEventKind::NodeTimeout), silent.num_milliseconds()))
                    } else {
                        None
                    }
                })
                .collect()
        };

        let mut ids = Vec::with_capacity(expired.len());
        for (event, silent_ms) in expired {
            tracing::warn!(node_id = %event.node_id, silent_ms, "node heartbeat expired, marking offline");
            TraceEvent::NodeTimedOut {
                node_id: event.node_id.clone(),
                silent_ms,
            }
            .emit();
            ids.push(event.node_id.clone());
            self.notifier.publish(event);
        }
        ids
    }

    /// Resolve a tool name to its owner and the owner's reachability.
    pub fn route(&self, tool_name: &str) -> Route {
        let inner = self.inner.read();
        let Some(node_id) = inner.index.resolve(tool_name) else {
            return Route::NotFound;
        };
        match inner.nodes.get(node_id) {
            Some(node) if node.status == NodeStatus::Online => Route::Ready {
                node_id: node.id.clone(),
                connection_id: node.connection_id.clone(),
            },
            _ => Route::Unavailable {
                node_id: node_id.to_string(),
            },
        }
    }

    pub fn get(&self, node_id: &str) -> Option<Node> {
        self.inner.read().nodes.get(node_id).cloned()
    }

    pub fn list(&self) -> Vec<Node> {
        self.inner.read().nodes.values().cloned().collect()
    }

    /// Ids of nodes currently addressed through `connection_id`.
    pub fn nodes_on_connection(&self, connection_id: &str) -> Vec<String> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|n| n.connection_id == connection_id)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Union of static data across online nodes. On key clashes the most
    /// recently registered node wins.
    pub fn merged_static_data(&self) -> HashMap<String, String> {
        let inner = self.inner.read();
        let mut online: Vec<&Node> = inner
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Online)
            .collect();
        online.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));

        let mut merged = HashMap::new();
        for node in online {
            merged.extend(node.static_data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    pub fn static_value(&self, key: &str) -> Option<String> {
        self.merged_static_data().remove(key)
    }

    /// Every routable tool with its owner, sorted by name.
    pub fn tools(&self) -> Vec<ToolEntry> {
        let inner = self.inner.read();
        let mut entries: Vec<ToolEntry> = inner
            .index
            .iter()
            .filter_map(|(tool, node_id)| {
                let node = inner.nodes.get(node_id)?;
                let desc = node.tools.iter().find(|t| t.name == tool);
                Some(ToolEntry {
                    name: tool.to_string(),
                    description: desc.map(|d| d.description.clone()).unwrap_or_default(),
                    parameter_schema: desc.and_then(|d| d.parameter_schema.clone()),
                    node_id: node_id.to_string(),
                    status: node.status,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn counts(&self) -> RegistryCounts {
        let inner = self.inner.read();
        RegistryCounts {
            nodes_total: inner.nodes.len(),
            nodes_online: inner
                .nodes
                .values()
                .filter(|n| n.status == NodeStatus::Online)
                .count(),
            tools_total: inner.index.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }
}

/// Apply a tool-list change to the index: stale names this node still owns
/// go away, every listed name points at this node.
fn reindex(
    index: &mut ToolIndex,
    node_id: &str,
    old: &[ToolDescriptor],
    new: &[ToolDescriptor],
    takeovers: &mut Vec<(String, String)>,
) {
    for stale in old.iter().filter(|o| !new.iter().any(|n| n.name == o.name)) {
        index.remove_owned_by(&stale.name, node_id);
    }
    for tool in new {
        if let Some(prev) = index.set(&tool.name, node_id) {
            if prev != node_id {
                takeovers.push((tool.name.clone(), prev));
            }
        }
    }
}

fn report_takeovers(node_id: &str, takeovers: Vec<(String, String)>) {
    for (tool, prev) in takeovers {
        tracing::warn!(
            tool = %tool,
            previous_node = %prev,
            node_id = %node_id,
            "tool re-registered by another node; routing to the newest owner"
        );
        TraceEvent::ToolOwnershipChanged {
            tool,
            from_node: prev,
            to_node: node_id.to_string(),
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_registry() -> (NodeRegistry, tokio::sync::broadcast::Receiver<NodeEvent>) {
        let notifier = Arc::new(ChangeNotifier::new(true, 64));
        let rx = notifier.subscribe();
        (NodeRegistry::new(notifier), rx)
    }

    fn reg(node_id: &str, tools: &[&str]) -> Registration {
        Registration {
            node_id: node_id.into(),
            connection_id: format!("conn-{node_id}"),
            display_name: Some(format!("{node_id} display")),
            tools: Some(tools.iter().map(|t| ToolDescriptor::new(*t, "")).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn register_indexes_tools_and_emits_online() {
        let (registry, mut rx) = make_registry();
        let node = registry.register(reg("a", &["translate", "summarize"]));
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.display_name, "a display");
        assert_eq!(
            registry.route("translate"),
            Route::Ready {
                node_id: "a".into(),
                connection_id: "conn-a".into()
            }
        );
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, NodeEventKind::NodeOnline);
        assert_eq!(ev.tool_count, 2);
    }

    #[test]
    fn reregister_replaces_tool_list() {
        let (registry, _rx) = make_registry();
        registry.register(reg("a", &["t1", "t2"]));
        let first = registry.get("a").unwrap().registered_at;
        registry.register(reg("a", &["t2", "t3"]));

        assert_eq!(registry.route("t1"), Route::NotFound);
        assert!(matches!(registry.route("t2"), Route::Ready { .. }));
        assert!(matches!(registry.route("t3"), Route::Ready { .. }));
        assert_eq!(registry.get("a").unwrap().registered_at, first);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregister_merges_static_data_and_keeps_tools_when_absent() {
        let (registry, _rx) = make_registry();
        let mut first = reg("a", &["t1"]);
        first.static_data = Some(HashMap::from([
            ("k1".to_string(), "v1".to_string()),
            ("k2".to_string(), "v2".to_string()),
        ]));
        registry.register(first);

        registry.register(Registration {
            node_id: "a".into(),
            connection_id: "conn-a2".into(),
            static_data: Some(HashMap::from([("k2".to_string(), "new".to_string())])),
            ..Default::default()
        });

        let node = registry.get("a").unwrap();
        assert_eq!(node.static_data["k1"], "v1");
        assert_eq!(node.static_data["k2"], "new");
        assert_eq!(node.tools.len(), 1);
        assert_eq!(node.connection_id, "conn-a2");
    }

    #[test]
    fn same_tool_last_writer_wins() {
        let (registry, _rx) = make_registry();
        registry.register(reg("a", &["translate"]));
        registry.register(reg("b", &["translate"]));
        assert_eq!(
            registry.route("translate"),
            Route::Ready {
                node_id: "b".into(),
                connection_id: "conn-b".into()
            }
        );

        // Unregistering the displaced owner must not drop b's entry.
        registry.unregister("a");
        assert!(matches!(registry.route("translate"), Route::Ready { .. }));
    }

    #[test]
    fn update_tools_removes_stale_entries() {
        let (registry, mut rx) = make_registry();
        registry.register(reg("a", &["t1", "t2"]));
        let _ = rx.try_recv();

        assert!(registry.update_tools("a", vec![ToolDescriptor::new("t3", "third")]));
        assert_eq!(registry.route("t1"), Route::NotFound);
        assert_eq!(registry.route("t2"), Route::NotFound);
        assert!(matches!(registry.route("t3"), Route::Ready { .. }));
        assert_eq!(rx.try_recv().unwrap().kind, NodeEventKind::ToolsUpdated);

        assert!(!registry.update_tools("ghost", vec![]));
    }

    #[test]
    fn unregister_removes_node_and_routes() {
        let (registry, mut rx) = make_registry();
        registry.register(reg("a", &["t1"]));
        let _ = rx.try_recv();

        let removed = registry.unregister("a").unwrap();
        assert_eq!(removed.status, NodeStatus::Offline);
        assert!(registry.is_empty());
        assert_eq!(registry.route("t1"), Route::NotFound);
        assert_eq!(rx.try_recv().unwrap().kind, NodeEventKind::NodeOffline);

        // Unknown node: warned and ignored.
        assert!(registry.unregister("a").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sweep_marks_silent_nodes_offline_once() {
        let (registry, mut rx) = make_registry();
        registry.register(reg("a", &["t1"]));
        let _ = rx.try_recv();

        let later = Utc::now() + chrono::Duration::milliseconds(200);
        let timeout = chrono::Duration::milliseconds(100);
        assert_eq!(registry.sweep_expired(later, timeout), vec!["a".to_string()]);
        assert_eq!(registry.get("a").unwrap().status, NodeStatus::Offline);
        assert_eq!(
            registry.route("t1"),
            Route::Unavailable { node_id: "a".into() }
        );
        assert_eq!(rx.try_recv().unwrap().kind, NodeEventKind::NodeTimeout);

        // Second sweep is idempotent.
        assert!(registry.sweep_expired(later, timeout).is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn heartbeat_recovers_offline_node() {
        let (registry, mut rx) = make_registry();
        registry.register(reg("a", &["t1"]));
        registry.sweep_expired(
            Utc::now() + chrono::Duration::seconds(10),
            chrono::Duration::seconds(1),
        );
        while rx.try_recv().is_ok() {}

        assert!(registry.touch_heartbeat("a"));
        assert_eq!(registry.get("a").unwrap().status, NodeStatus::Online);
        assert!(matches!(registry.route("t1"), Route::Ready { .. }));
        assert_eq!(rx.try_recv().unwrap().kind, NodeEventKind::NodeOnline);

        assert!(!registry.touch_heartbeat("ghost"));
    }

    #[test]
    fn merged_static_data_skips_offline_nodes() {
        let (registry, _rx) = make_registry();
        let mut a = reg("a", &[]);
        a.static_data = Some(HashMap::from([("shared".to_string(), "from-a".to_string())]));
        registry.register(a);
        let mut b = reg("b", &[]);
        b.static_data = Some(HashMap::from([
            ("shared".to_string(), "from-b".to_string()),
            ("only_b".to_string(), "x".to_string()),
        ]));
        registry.register(b);

        assert_eq!(registry.static_value("shared").as_deref(), Some("from-b"));

        registry.update_static_data("b", HashMap::new());
        assert_eq!(registry.static_value("shared").as_deref(), Some("from-a"));
        assert!(registry.static_value("only_b").is_none());

        registry.sweep_expired(
            Utc::now() + chrono::Duration::seconds(10),
            chrono::Duration::seconds(1),
        );
        assert!(registry.merged_static_data().is_empty());
    }

    #[test]
    fn tools_and_counts_reflect_index() {
        let (registry, _rx) = make_registry();
        let mut a = reg("a", &[]);
        a.tools = Some(vec![ToolDescriptor {
            name: "translate".into(),
            description: "Translate text".into(),
            parameter_schema: Some(serde_json::json!({"type": "object"})),
        }]);
        registry.register(a);
        registry.register(reg("b", &["echo"]));

        let tools = registry.tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[1].description, "Translate text");
        assert!(tools[1].parameter_schema.is_some());

        let counts = registry.counts();
        assert_eq!(counts.nodes_total, 2);
        assert_eq!(counts.nodes_online, 2);
        assert_eq!(counts.tools_total, 2);
        assert_eq!(registry.nodes_on_connection("conn-b"), vec!["b".to_string()]);
    }
}
