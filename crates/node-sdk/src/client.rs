//! Node client: owns the WebSocket lifecycle, heartbeat, and call
//! dispatch via [`ToolRegistry`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use th_protocol::WsMessage;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectBackoff;
use crate::registry::ToolRegistry;
use crate::types::{NodeSdkError, ToolContext};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const REGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const UNREGISTER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A configured node client ready to connect to the hub.
///
/// Create via [`NodeClientBuilder`](crate::builder::NodeClientBuilder).
pub struct NodeClient {
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

impl NodeClient {
    pub fn builder() -> crate::builder::NodeClientBuilder {
        crate::builder::NodeClientBuilder::new()
    }

    /// Connect, register, and serve calls until `shutdown` fires.
    ///
    /// Lost connections are retried according to the [`ReconnectBackoff`]
    /// policy; the backoff resets after every successful registration. On
    /// shutdown the node sends `unregister` before closing and this returns
    /// [`NodeSdkError::Shutdown`].
    pub async fn run(
        self,
        registry: ToolRegistry,
        shutdown: CancellationToken,
    ) -> Result<(), NodeSdkError> {
        let registry = Arc::new(registry);
        let mut node_id = self.node_id.clone();
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(NodeSdkError::Shutdown);
            }

            let result = self.connect_and_run(&registry, &mut node_id, &shutdown).await;

            if shutdown.is_cancelled() {
                tracing::info!(node_id = ?node_id, "shutdown requested");
                return Err(NodeSdkError::Shutdown);
            }

            match result {
                Ok(registered) => {
                    tracing::info!(node_id = ?node_id, registered, "hub connection closed");
                    if registered {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    tracing::warn!(node_id = ?node_id, attempt, error = %e, "hub connection lost");
                }
            }

            attempt += 1;
            if self.reconnect_backoff.should_give_up(attempt) {
                tracing::error!(node_id = ?node_id, attempts = attempt, "giving up on hub");
                return Err(NodeSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt - 1);
            tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(NodeSdkError::Shutdown),
            }
        }
    }

    /// [`run`](Self::run) on a fresh task.
    pub fn spawn(
        self,
        registry: ToolRegistry,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), NodeSdkError>> {
        tokio::spawn(async move { self.run(registry, shutdown).await })
    }

    /// One connection: connect, register, serve. Returns whether the hub
    /// acknowledged the registration before the connection ended.
    async fn connect_and_run(
        &self,
        registry: &Arc<ToolRegistry>,
        node_id: &mut Option<String>,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<bool> {
        tracing::info!(url = %self.hub_ws_url, "connecting to hub");

        let ws = tokio::select! {
            r = tokio_tungstenite::connect_async(self.hub_ws_url.as_str()) => r?.0,
            _ = shutdown.cancelled() => return Ok(false),
        };
        let (mut sink, mut stream) = ws.split();

        // ── Register ─────────────────────────────────────────────────
        send_json(&mut sink, &self.register_message(registry, node_id.clone())).await?;

        let ack = tokio::select! {
            r = tokio::time::timeout(REGISTER_ACK_TIMEOUT, async {
                while let Some(frame) = stream.next().await {
                    if let Message::Text(text) = frame? {
                        if let Ok(WsMessage::RegisterAck { success, node_id, message }) =
                            serde_json::from_str(&text)
                        {
                            return Ok::<_, anyhow::Error>((success, node_id, message));
                        }
                    }
                }
                Err(anyhow::anyhow!("connection closed before register_ack"))
            }) => r,
            _ = shutdown.cancelled() => return Ok(false),
        };

        let (success, assigned, message) = match ack {
            Ok(r) => r?,
            Err(_) => anyhow::bail!("register_ack timeout"),
        };
        if !success {
            return Err(NodeSdkError::Registration(message.unwrap_or_default()).into());
        }

        tracing::info!(
            node_id = %assigned,
            tools = registry.len(),
            message = message.as_deref().unwrap_or(""),
            "registered with hub"
        );
        *node_id = Some(assigned.clone());

        // ── Serve ────────────────────────────────────────────────────
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsMessage>(64);
        let tool_semaphore = Arc::new(Semaphore::new(self.max_concurrent_tools));
        let inflight_cancel = CancellationToken::new();
        let closing = CancellationToken::new();

        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_id = assigned.clone();
        let period = self.heartbeat_interval;
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let msg = WsMessage::Heartbeat {
                    node_id: heartbeat_id.clone(),
                };
                if heartbeat_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let writer_closing = closing.clone();
        let writer_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if send_json(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    _ = writer_closing.cancelled() => {
                        while let Ok(msg) = outbound_rx.try_recv() {
                            let _ = send_json(&mut sink, &msg).await;
                        }
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let mut graceful = false;
        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = shutdown.cancelled() => {
                    graceful = true;
                    break;
                }
            };
            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("hub closed connection");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket read error");
                    break;
                }
            };

            if text.len() > self.max_request_bytes {
                tracing::warn!(
                    bytes = text.len(),
                    max = self.max_request_bytes,
                    "inbound frame exceeds max_request_bytes, dropping"
                );
                continue;
            }

            match serde_json::from_str::<WsMessage>(&text) {
                Ok(WsMessage::Call {
                    call_id,
                    tool_name,
                    params,
                }) => {
                    tracing::debug!(call_id = %call_id, tool = %tool_name, "received call");
                    let ctx = ToolContext {
                        call_id,
                        tool_name,
                        cancel: inflight_cancel.child_token(),
                    };
                    let reg = registry.clone();
                    let tx = outbound_tx.clone();
                    let sem = tool_semaphore.clone();
                    let max_resp = self.max_response_bytes;
                    tokio::spawn(async move {
                        let Ok(_permit) = sem.acquire_owned().await else {
                            return;
                        };
                        let result = execute_call(&reg, ctx, params, max_resp).await;
                        let _ = tx.send(result).await;
                    });
                }
                Ok(other) => {
                    tracing::debug!(kind = other.kind(), "ignoring message");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "unparseable message");
                }
            }
        }

        inflight_cancel.cancel();
        heartbeat_task.abort();

        if graceful {
            let _ = outbound_tx
                .send(WsMessage::Unregister {
                    node_id: assigned.clone(),
                })
                .await;
            closing.cancel();
            if tokio::time::timeout(UNREGISTER_FLUSH_TIMEOUT, writer_task).await.is_err() {
                tracing::warn!(node_id = %assigned, "unregister not flushed before timeout");
            }
        } else {
            writer_task.abort();
        }

        Ok(true)
    }

    fn register_message(&self, registry: &ToolRegistry, node_id: Option<String>) -> WsMessage {
        WsMessage::Register {
            node_id,
            display_name: self.display_name.clone(),
            endpoint: self.endpoint.clone(),
            tools: Some(registry.descriptors()),
            static_data: (!self.static_data.is_empty()).then(|| self.static_data.clone()),
            metadata: self.metadata.clone(),
        }
    }
}

async fn send_json(sink: &mut WsSink, msg: &WsMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

/// Run one call to completion. Every path yields a `call_result`, including
/// unknown tools and panicking handlers.
async fn execute_call(
    registry: &ToolRegistry,
    ctx: ToolContext,
    params: serde_json::Value,
    max_response_bytes: usize,
) -> WsMessage {
    let started = Instant::now();
    let call_id = ctx.call_id.clone();
    let tool_name = ctx.tool_name.clone();

    let (success, output, error) = match registry.get(&tool_name) {
        Some(handler) => match AssertUnwindSafe(handler.call(ctx, params)).catch_unwind().await {
            Ok(Ok(value)) => (true, Some(truncate_output(value, max_response_bytes)), None),
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => {
                tracing::error!(tool = %tool_name, call_id = %call_id, "tool handler panicked");
                (false, None, Some("tool handler panicked".to_owned()))
            }
        },
        None => {
            tracing::warn!(tool = %tool_name, "no handler registered for tool");
            (false, None, Some(format!("unknown tool: {tool_name}")))
        }
    };

    WsMessage::CallResult {
        call_id,
        success,
        output,
        data: None,
        error,
        duration_ms: Some(started.elapsed().as_millis() as u64),
    }
}

/// Replace oversized output with a marker object holding a prefix of the
/// serialized value, cut on a UTF-8 boundary.
fn truncate_output(value: serde_json::Value, max_bytes: usize) -> serde_json::Value {
    let serialized = match serde_json::to_string(&value) {
        Ok(s) => s,
        Err(_) => return value,
    };
    if serialized.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes;
    while !serialized.is_char_boundary(cut) {
        cut -= 1;
    }
    serde_json::json!({
        "_truncated": true,
        "_original_bytes": serialized.len(),
        "partial": &serialized[..cut],
    })
}
