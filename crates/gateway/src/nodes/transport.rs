//! Transport port used by the router, and the connection table that backs
//! the WebSocket endpoint.
//!
//! The router only ever talks to `dyn Transport`; it never sees sockets.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use th_protocol::WsMessage;
use tokio::sync::mpsc;

/// Outbound queue for one connection. A writer task drains it into the socket.
pub type ConnectionSink = mpsc::Sender<WsMessage>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("connection {0} closed")]
    Closed(String),
}

/// Outbound side of whatever carries messages between hub and nodes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, connection_id: &str, msg: WsMessage) -> Result<(), TransportError>;

    /// Returns the number of connections the message was queued for.
    async fn send_to_all(&self, msg: WsMessage) -> usize;

    /// Returns the number of group members the message was queued for.
    async fn send_to_group(&self, group: &str, msg: WsMessage) -> usize;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConnectionHub
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Connection {
    sink: ConnectionSink,
    groups: HashSet<String>,
    opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub groups: Vec<String>,
    pub opened_at: DateTime<Utc>,
}

/// Live transport connections keyed by a hub-assigned connection id.
pub struct ConnectionHub {
    connections: RwLock<HashMap<String, Connection>>,
    queue_capacity: usize,
}

impl ConnectionHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection. The caller drains the returned receiver.
    pub fn open(&self, groups: impl IntoIterator<Item = String>) -> (String, mpsc::Receiver<WsMessage>) {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let groups: HashSet<String> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        tracing::debug!(connection_id = %connection_id, groups = ?groups, "connection opened");
        self.connections.write().insert(
            connection_id.clone(),
            Connection {
                sink: tx,
                groups,
                opened_at: Utc::now(),
            },
        );
        (connection_id, rx)
    }

    pub fn close(&self, connection_id: &str) -> bool {
        let removed = self.connections.write().remove(connection_id).is_some();
        if removed {
            tracing::debug!(connection_id = %connection_id, "connection closed");
        }
        removed
    }

    pub fn join(&self, connection_id: &str, group: &str) -> bool {
        match self.connections.write().get_mut(connection_id) {
            Some(conn) => conn.groups.insert(group.to_string()),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut list: Vec<ConnectionInfo> = self
            .connections
            .read()
            .iter()
            .map(|(id, c)| {
                let mut groups: Vec<String> = c.groups.iter().cloned().collect();
                groups.sort();
                ConnectionInfo {
                    connection_id: id.clone(),
                    groups,
                    opened_at: c.opened_at,
                }
            })
            .collect();
        list.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        list
    }

    fn sinks_where(&self, pred: impl Fn(&Connection) -> bool) -> Vec<(String, ConnectionSink)> {
        self.connections
            .read()
            .iter()
            .filter(|(_, c)| pred(c))
            .map(|(id, c)| (id.clone(), c.sink.clone()))
            .collect()
    }

    /// Fan-out never waits on a slow reader; a full queue drops the message
    /// for that connection only.
    fn fan_out(targets: Vec<(String, ConnectionSink)>, msg: &WsMessage) -> usize {
        targets
            .into_iter()
            .filter(|(id, sink)| match sink.try_send(msg.clone()) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(connection_id = %id, error = %e, kind = msg.kind(), "fan-out skipped connection");
                    false
                }
            })
            .count()
    }
}

#[async_trait]
impl Transport for ConnectionHub {
    async fn send_to(&self, connection_id: &str, msg: WsMessage) -> Result<(), TransportError> {
        let sink = self
            .connections
            .read()
            .get(connection_id)
            .map(|c| c.sink.clone())
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;

        sink.send(msg)
            .await
            .map_err(|_| TransportError::Closed(connection_id.to_string()))
    }

    async fn send_to_all(&self, msg: WsMessage) -> usize {
        Self::fan_out(self.sinks_where(|_| true), &msg)
    }

    async fn send_to_group(&self, group: &str, msg: WsMessage) -> usize {
        Self::fan_out(self.sinks_where(|c| c.groups.contains(group)), &msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(id: &str) -> WsMessage {
        WsMessage::Heartbeat { node_id: id.into() }
    }

    #[tokio::test]
    async fn send_to_delivers_to_one_connection() {
        let hub = ConnectionHub::new(8);
        let (a, mut rx_a) = hub.open(Vec::new());
        let (_b, mut rx_b) = hub.open(Vec::new());

        hub.send_to(&a, heartbeat("x")).await.unwrap();
        assert_eq!(rx_a.recv().await, Some(heartbeat("x")));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_or_closed_connection_fails() {
        let hub = ConnectionHub::new(8);
        let err = hub.send_to("nope", heartbeat("x")).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownConnection(_)));

        let (a, rx) = hub.open(Vec::new());
        drop(rx);
        let err = hub.send_to(&a, heartbeat("x")).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn group_fan_out_reaches_members_only() {
        let hub = ConnectionHub::new(8);
        let (_obs, mut rx_obs) = hub.open(vec!["observers".to_string()]);
        let (plain, mut rx_plain) = hub.open(Vec::new());

        assert_eq!(hub.send_to_group("observers", heartbeat("g")).await, 1);
        assert_eq!(rx_obs.recv().await, Some(heartbeat("g")));
        assert!(rx_plain.try_recv().is_err());

        assert!(hub.join(&plain, "observers"));
        assert_eq!(hub.send_to_group("observers", heartbeat("g2")).await, 2);
        assert_eq!(hub.send_to_all(heartbeat("all")).await, 2);
    }

    #[tokio::test]
    async fn close_removes_connection() {
        let hub = ConnectionHub::new(8);
        let (a, _rx) = hub.open(vec!["observers".to_string()]);
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.list()[0].groups, vec!["observers".to_string()]);
        assert!(hub.close(&a));
        assert!(!hub.close(&a));
        assert!(hub.is_empty());
        assert_eq!(hub.send_to_all(heartbeat("x")).await, 0);
    }
}
