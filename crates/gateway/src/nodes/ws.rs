//! WebSocket endpoint for node and observer connections.
//!
//! Flow:
//! 1. Client connects to `/v1/nodes/ws` (optionally `?group=observers`).
//! 2. The hub assigns a connection id and starts a writer task draining the
//!    connection's outbound queue.
//! 3. Every inbound text frame is parsed as a `WsMessage` and handed to the
//!    router; nodes announce themselves with `register` on this channel.
//! 4. On close, calls in flight to the connection's nodes fail. The node
//!    records stay; heartbeat expiry takes them offline if none reconnect.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use th_protocol::WsMessage;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query params
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Comma-separated broadcast groups to join (e.g. `observers`).
    pub group: Option<String>,
}

impl WsQuery {
    fn groups(&self) -> Vec<String> {
        self.group
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /v1/nodes/ws: upgrade to WebSocket.
pub async fn node_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let max_bytes = state.config.server.max_message_bytes;
    let groups = query.groups();
    ws.max_message_size(max_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, groups))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, groups: Vec<String>) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (connection_id, mut outbound_rx) = state.hub.open(groups.clone());

    tracing::info!(connection_id = %connection_id, groups = ?groups, "transport connection opened");

    // Writer task: forwards outbound queue messages to the WS sink.
    let writer_conn = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_ws_message(&mut ws_sink, &msg).await {
                tracing::debug!(connection_id = %writer_conn, error = %e, "ws write failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: process inbound messages until close or shutdown.
    loop {
        let frame = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            frame = ws_stream.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "ws read error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<WsMessage>(&text) {
                Ok(ws_msg) => state.router.handle_inbound(&connection_id, ws_msg).await,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "ignoring unparseable message"
                    );
                }
            },
            Message::Close(_) => break,
            // axum answers WS-level pings itself.
            _ => {}
        }
    }

    // Cleanup: fail calls routed here, stop the writer.
    state.hub.close(&connection_id);
    let detached = state.router.connection_closed(&connection_id);
    writer.abort();
    tracing::info!(
        connection_id = %connection_id,
        nodes_detached = detached,
        "transport connection closed"
    );
}

async fn send_ws_message(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &WsMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sink.send(Message::Text(json)).await
}
