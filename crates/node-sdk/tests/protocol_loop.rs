//! Boots an in-process WebSocket server playing the hub side of the node
//! protocol, connects a real [`NodeClient`], and drives the full
//! register → call → call_result cycle.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use th_node_sdk::{
    NodeClientBuilder, NodeSdkError, NodeTool, ReconnectBackoff, ToolContext, ToolRegistry,
    ToolResult, WsMessage,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

struct EchoTool;

#[async_trait::async_trait]
impl NodeTool for EchoTool {
    async fn call(&self, _ctx: ToolContext, params: serde_json::Value) -> ToolResult {
        Ok(serde_json::json!({ "echoed": params }))
    }
}

struct PanicTool;

#[async_trait::async_trait]
impl NodeTool for PanicTool {
    async fn call(&self, _ctx: ToolContext, _params: serde_json::Value) -> ToolResult {
        panic!("intentional panic");
    }
}

// ── Mini hub ────────────────────────────────────────────────────────────

/// Handle to one accepted node connection.
struct HubConn {
    /// The `register` the node opened with.
    register: WsMessage,
    /// Push messages to the node. Dropping it closes the socket.
    send: mpsc::Sender<WsMessage>,
    /// Everything the node sent after registering.
    recv: mpsc::Receiver<WsMessage>,
}

/// Accepts connections on an ephemeral port. Nodes that register without
/// an id are assigned `assigned-<n>`. With `accept == false` every
/// registration is refused.
async fn start_mini_hub(accept: bool) -> (SocketAddr, mpsc::Receiver<HubConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        let mut counter = 0u32;
        while let Ok((stream, _peer)) = listener.accept().await {
            counter += 1;
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                let register = loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(msg @ WsMessage::Register { .. }) = serde_json::from_str(&text) {
                                break msg;
                            }
                        }
                        _ => return,
                    }
                };

                let WsMessage::Register { node_id, .. } = &register else {
                    unreachable!()
                };
                let ack = WsMessage::RegisterAck {
                    success: accept,
                    node_id: node_id.clone().unwrap_or_else(|| format!("assigned-{counter}")),
                    message: (!accept).then(|| "registrations closed".to_owned()),
                };
                let json = serde_json::to_string(&ack).unwrap();
                if sink.send(Message::Text(json)).await.is_err() || !accept {
                    return;
                }

                let (to_node_tx, mut to_node_rx) = mpsc::channel::<WsMessage>(16);
                let (from_node_tx, from_node_rx) = mpsc::channel::<WsMessage>(64);
                let _ = conn_tx
                    .send(HubConn {
                        register,
                        send: to_node_tx,
                        recv: from_node_rx,
                    })
                    .await;

                let read_task = tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(msg) = serde_json::from_str::<WsMessage>(&text) {
                                let _ = from_node_tx.send(msg).await;
                            }
                        }
                    }
                });

                while let Some(msg) = to_node_rx.recv().await {
                    let json = serde_json::to_string(&msg).unwrap();
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                let _ = read_task.await;
            });
        }
    });

    (addr, conn_rx)
}

impl HubConn {
    /// Wait for the next message matching `pred`, skipping the rest.
    async fn next_matching(&mut self, pred: impl Fn(&WsMessage) -> bool) -> WsMessage {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.recv.recv()).await {
                Ok(Some(msg)) if pred(&msg) => return msg,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("connection dropped"),
                Err(_) => panic!("timed out waiting for message"),
            }
        }
    }

    /// Send a `call` and wait for its `call_result`.
    async fn call(&mut self, call_id: &str, tool: &str, params: serde_json::Value) -> WsMessage {
        self.send
            .send(WsMessage::Call {
                call_id: call_id.into(),
                tool_name: tool.into(),
                params,
            })
            .await
            .unwrap();
        let id = call_id.to_owned();
        self.next_matching(move |m| matches!(m, WsMessage::CallResult { call_id, .. } if *call_id == id))
            .await
    }
}

async fn next_conn(rx: &mut mpsc::Receiver<HubConn>) -> HubConn {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for node connection")
        .expect("hub stopped")
}

fn registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register("echo", "Echo params back", EchoTool)
        .register("explode", "Always panics", PanicTool);
    reg
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_call_and_unregister() {
    let (addr, mut conns) = start_mini_hub(true).await;
    let shutdown = CancellationToken::new();

    let client = NodeClientBuilder::new()
        .hub_ws_url(format!("ws://{addr}/"))
        .display_name("Integration Node")
        .static_value("region", "eu")
        .heartbeat_interval(Duration::from_millis(50))
        .max_concurrent_tools(4)
        .reconnect_backoff(ReconnectBackoff::no_retry())
        .build()
        .unwrap();
    let handle = client.spawn(registry(), shutdown.clone());

    let mut conn = next_conn(&mut conns).await;

    // ── register contents ────────────────────────────────────────────
    let WsMessage::Register { node_id, display_name, tools, static_data, .. } = &conn.register else {
        unreachable!()
    };
    assert!(node_id.is_none());
    assert_eq!(display_name.as_deref(), Some("Integration Node"));
    let names: Vec<&str> = tools.as_ref().unwrap().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "explode"]);
    assert_eq!(static_data.as_ref().unwrap()["region"], "eu");

    // ── heartbeat carries the assigned id ────────────────────────────
    let hb = conn.next_matching(|m| matches!(m, WsMessage::Heartbeat { .. })).await;
    assert_eq!(hb, WsMessage::Heartbeat { node_id: "assigned-1".into() });

    // ── call round trips ─────────────────────────────────────────────
    match conn.call("c-1", "echo", serde_json::json!({"hello": "world"})).await {
        WsMessage::CallResult { success, output, error, .. } => {
            assert!(success, "unexpected error: {error:?}");
            assert_eq!(output, Some(serde_json::json!({"echoed": {"hello": "world"}})));
        }
        other => panic!("expected call_result, got {other:?}"),
    }

    match conn.call("c-2", "missing", serde_json::json!({})).await {
        WsMessage::CallResult { success, error, .. } => {
            assert!(!success);
            assert_eq!(error.as_deref(), Some("unknown tool: missing"));
        }
        other => panic!("expected call_result, got {other:?}"),
    }

    match conn.call("c-3", "explode", serde_json::json!({})).await {
        WsMessage::CallResult { success, error, .. } => {
            assert!(!success);
            assert!(error.unwrap().contains("panicked"));
        }
        other => panic!("expected call_result, got {other:?}"),
    }

    match conn.call("c-4", "ECHO", serde_json::json!({"case": "insensitive"})).await {
        WsMessage::CallResult { success, output, .. } => {
            assert!(success);
            assert_eq!(output, Some(serde_json::json!({"echoed": {"case": "insensitive"}})));
        }
        other => panic!("expected call_result, got {other:?}"),
    }

    // ── graceful shutdown sends unregister ───────────────────────────
    shutdown.cancel();
    let unregister = conn.next_matching(|m| matches!(m, WsMessage::Unregister { .. })).await;
    assert_eq!(unregister, WsMessage::Unregister { node_id: "assigned-1".into() });

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(NodeSdkError::Shutdown)));
}

#[tokio::test]
async fn reconnect_reuses_assigned_id() {
    let (addr, mut conns) = start_mini_hub(true).await;
    let shutdown = CancellationToken::new();

    let client = NodeClientBuilder::new()
        .hub_ws_url(format!("ws://{addr}/"))
        .heartbeat_interval(Duration::from_secs(60))
        .reconnect_backoff(ReconnectBackoff {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_factor: 2.0,
            max_attempts: 5,
        })
        .build()
        .unwrap();
    let handle = client.spawn(registry(), shutdown.clone());

    let first = next_conn(&mut conns).await;
    assert!(matches!(&first.register, WsMessage::Register { node_id: None, .. }));
    drop(first);

    let second = next_conn(&mut conns).await;
    let WsMessage::Register { node_id, .. } = &second.register else {
        unreachable!()
    };
    assert_eq!(node_id.as_deref(), Some("assigned-1"));

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}

#[tokio::test]
async fn rejected_registration_exhausts_retries() {
    let (addr, _conns) = start_mini_hub(false).await;

    let client = NodeClientBuilder::new()
        .hub_ws_url(format!("ws://{addr}/"))
        .node_id("refused")
        .reconnect_backoff(ReconnectBackoff::no_retry())
        .build()
        .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.run(registry(), CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(NodeSdkError::ReconnectExhausted(1))));
}
