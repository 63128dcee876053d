//! Fluent construction of a [`NodeClient`].

use std::collections::HashMap;
use std::time::Duration;

use crate::client::NodeClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::NodeSdkError;

/// Builder for [`NodeClient`].
///
/// ```rust,no_run
/// # use th_node_sdk::NodeClientBuilder;
/// let client = NodeClientBuilder::new()
///     .hub_ws_url("ws://localhost:3220/v1/nodes/ws")
///     .node_id("translator-1")
///     .display_name("Translator")
///     .static_value("languages", "en,fr,de")
///     .heartbeat_interval(std::time::Duration::from_secs(10))
///     .build()
///     .unwrap();
/// ```
pub struct NodeClientBuilder {
    pub(crate) hub_ws_url: String,
    pub(crate) node_id: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) endpoint: Option<String>,
    pub(crate) static_data: HashMap<String, String>,
    pub(crate) metadata: Option<serde_json::Value>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) max_concurrent_tools: usize,
    pub(crate) max_request_bytes: usize,
    pub(crate) max_response_bytes: usize,
}

impl NodeClientBuilder {
    pub fn new() -> Self {
        Self {
            hub_ws_url: "ws://localhost:3220/v1/nodes/ws".into(),
            node_id: None,
            display_name: None,
            endpoint: None,
            static_data: HashMap::new(),
            metadata: None,
            heartbeat_interval: Duration::from_secs(10),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_tools: 16,
            max_request_bytes: 1024 * 1024,
            max_response_bytes: 1024 * 1024,
        }
    }

    /// Hub WebSocket URL (e.g. `wss://hub.example.com/v1/nodes/ws`).
    pub fn hub_ws_url(mut self, url: impl Into<String>) -> Self {
        self.hub_ws_url = url.into();
        self
    }

    /// Stable node identifier. Left unset, the hub assigns one on first
    /// registration and the client reuses it across reconnects.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Informational address reported to the hub; never dialled.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Publish one static key/value pair.
    pub fn static_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_data.insert(key.into(), value.into());
        self
    }

    /// Publish a whole static data map, replacing anything set before.
    pub fn static_data(mut self, data: HashMap<String, String>) -> Self {
        self.static_data = data;
        self
    }

    /// Free-form JSON metadata carried in `register`.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Heartbeat period (default 10s). Keep it well under the hub's
    /// `router.heartbeat_timeout_ms`.
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Maximum calls executing at once (default 16).
    pub fn max_concurrent_tools(mut self, n: usize) -> Self {
        self.max_concurrent_tools = n;
        self
    }

    /// Inbound frames larger than this are dropped unparsed (default 1 MiB).
    pub fn max_request_bytes(mut self, n: usize) -> Self {
        self.max_request_bytes = n;
        self
    }

    /// Tool output larger than this is truncated (default 1 MiB).
    pub fn max_response_bytes(mut self, n: usize) -> Self {
        self.max_response_bytes = n;
        self
    }

    pub fn build(self) -> Result<NodeClient, NodeSdkError> {
        if self.hub_ws_url.trim().is_empty() {
            return Err(NodeSdkError::Config("hub_ws_url is required".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(NodeSdkError::Config("heartbeat_interval must be non-zero".into()));
        }
        if self.max_concurrent_tools == 0 {
            return Err(NodeSdkError::Config("max_concurrent_tools must be at least 1".into()));
        }
        if matches!(&self.node_id, Some(id) if id.trim().is_empty()) {
            return Err(NodeSdkError::Config("node_id must not be blank".into()));
        }

        Ok(NodeClient {
            hub_ws_url: self.hub_ws_url,
            node_id: self.node_id,
            display_name: self.display_name,
            endpoint: self.endpoint,
            static_data: self.static_data,
            metadata: self.metadata,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_backoff: self.reconnect_backoff,
            max_concurrent_tools: self.max_concurrent_tools,
            max_request_bytes: self.max_request_bytes,
            max_response_bytes: self.max_response_bytes,
        })
    }
}

impl Default for NodeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            NodeClientBuilder::new().hub_ws_url("  ").build(),
            Err(NodeSdkError::Config(_))
        ));
        assert!(matches!(
            NodeClientBuilder::new().heartbeat_interval(Duration::ZERO).build(),
            Err(NodeSdkError::Config(_))
        ));
        assert!(matches!(
            NodeClientBuilder::new().node_id("").build(),
            Err(NodeSdkError::Config(_))
        ));
    }

    #[test]
    fn static_values_accumulate() {
        let b = NodeClientBuilder::new()
            .static_value("a", "1")
            .static_value("b", "2");
        assert_eq!(b.static_data.len(), 2);
        assert!(b.build().is_ok());
    }
}
