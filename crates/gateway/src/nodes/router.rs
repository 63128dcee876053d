//! Router facade: dispatches tool calls to the node that owns each tool and
//! applies inbound node messages to the registry and correlator.
//!
//! Routing rules:
//! 1. Look the tool up in the index; unknown → `ToolNotFound`.
//! 2. Owner offline or gone → `NodeUnavailable`.
//! 3. Send `call` through the attached transport and wait for the matching
//!    `call_result`, the deadline, or cancellation, with no lock held.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use th_domain::config::RouterConfig;
use th_domain::trace::TraceEvent;
use th_domain::RouteError;
use th_protocol::WsMessage;

use super::correlator::{CallCorrelator, CallResult, PendingInfo};
use super::heartbeat::HeartbeatMonitor;
use super::notifier::{ChangeNotifier, NodeEvent};
use super::registry::{NodeRegistry, Registration, Route};
use super::transport::Transport;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-call overrides for [`Router::invoke_with`].
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Replaces `call_timeout_ms` for this call.
    pub timeout: Option<Duration>,
    /// Cancelling this token resolves the call with `Cancelled`.
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub nodes_total: usize,
    pub nodes_online: usize,
    pub nodes_offline: usize,
    pub tools_total: usize,
    pub pending_calls: usize,
}

/// Cancels the pending entry if the invoking future is dropped mid-flight.
struct PendingGuard<'a> {
    correlator: &'a CallCorrelator,
    call_id: &'a str,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.cancel(self.call_id, "caller dropped");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Router {
    config: RouterConfig,
    registry: Arc<NodeRegistry>,
    correlator: CallCorrelator,
    notifier: Arc<ChangeNotifier>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Task relaying notifier events to the observer group.
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let notifier = Arc::new(ChangeNotifier::new(config.broadcast_state_changes, 256));
        let registry = Arc::new(NodeRegistry::new(notifier.clone()));
        let correlator = CallCorrelator::new(config.max_pending_global, config.max_pending_per_node);
        Self {
            config,
            registry,
            correlator,
            notifier,
            transport: RwLock::new(None),
            forwarder: Mutex::new(None),
        }
    }

    /// Attach the outbound transport. Node events start flowing to the
    /// observer group when broadcasting is enabled.
    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport.clone());

        if !self.notifier.is_enabled() {
            return;
        }
        let mut rx = self.notifier.subscribe();
        let group = self.config.observer_group.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let delivered = transport.send_to_group(&group, event.to_message()).await;
                        tracing::debug!(
                            node_id = %event.node_id,
                            group = %group,
                            delivered,
                            "node event forwarded"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "node event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.forwarder.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &CallCorrelator {
        &self.correlator
    }

    /// Node lifecycle events, published only when broadcasting is enabled.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.notifier.subscribe()
    }

    pub fn heartbeat_monitor(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            self.registry.clone(),
            self.config.heartbeat_timeout(),
            self.config.sweep_interval(),
        )
    }

    // ── Invocation ─────────────────────────────────────────────────

    /// Route a tool call with the configured timeout.
    pub async fn invoke(&self, tool_name: &str, params: Value) -> Result<CallResult, RouteError> {
        self.invoke_with(tool_name, params, InvokeOptions::default()).await
    }

    pub async fn invoke_with(
        &self,
        tool_name: &str,
        params: Value,
        opts: InvokeOptions,
    ) -> Result<CallResult, RouteError> {
        let started = Instant::now();

        let (node_id, connection_id) = match self.registry.route(tool_name) {
            Route::NotFound => {
                tracing::debug!(tool = %tool_name, "no node serves tool");
                return Err(RouteError::ToolNotFound {
                    tool: tool_name.to_string(),
                });
            }
            Route::Unavailable { node_id } => {
                return Err(RouteError::NodeUnavailable {
                    tool: tool_name.to_string(),
                    node_id,
                });
            }
            Route::Ready {
                node_id,
                connection_id,
            } => (node_id, connection_id),
        };

        let transport = self
            .transport
            .read()
            .clone()
            .ok_or(RouteError::TransportUnavailable)?;

        let timeout = opts.timeout.unwrap_or_else(|| self.config.call_timeout());
        let mut pending = self
            .correlator
            .begin_call(tool_name, &node_id, params.clone(), timeout)?;
        let call_id = pending.call_id().to_string();
        let mut guard = PendingGuard {
            correlator: &self.correlator,
            call_id: &call_id,
            armed: true,
        };

        tracing::debug!(
            tool = %tool_name,
            node_id = %node_id,
            call_id = %call_id,
            timeout_ms = timeout.as_millis() as u64,
            "routing call"
        );

        let msg = WsMessage::Call {
            call_id: call_id.clone(),
            tool_name: tool_name.to_string(),
            params,
        };
        let cancel = opts.cancel.unwrap_or_default();

        // The deadline and the caller's token apply to the send as well: a
        // stalled connection must not hold the caller past either.
        let outcome = 'call: {
            let sent = tokio::select! {
                sent = transport.send_to(&connection_id, msg) => sent,
                out = &mut pending => break 'call out,
                _ = cancel.cancelled() => {
                    self.correlator.cancel(&call_id, "cancelled by caller");
                    break 'call (&mut pending).await;
                }
            };

            if let Err(e) = sent {
                // Already resolved (deadline, shutdown) → report that instead.
                if !self.correlator.cancel(&call_id, "send failed") {
                    break 'call (&mut pending).await;
                }
                let _ = (&mut pending).await;
                break 'call Err(RouteError::SendFailed {
                    node_id: node_id.clone(),
                    message: e.to_string(),
                });
            }

            tokio::select! {
                out = &mut pending => out,
                _ = cancel.cancelled() => {
                    self.correlator.cancel(&call_id, "cancelled by caller");
                    // A result that won the race is still delivered.
                    (&mut pending).await
                }
            }
        };
        guard.disarm();

        record_call(tool_name, &node_id, &call_id, &outcome, started);
        outcome
    }

    // ── Inbound ────────────────────────────────────────────────────

    /// Apply one message received on `connection_id`.
    pub async fn handle_inbound(&self, connection_id: &str, msg: WsMessage) {
        match msg {
            WsMessage::Register {
                node_id,
                display_name,
                endpoint,
                tools,
                static_data,
                metadata,
            } => {
                let node_id = node_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let node = self.registry.register(Registration {
                    node_id,
                    connection_id: connection_id.to_string(),
                    display_name,
                    endpoint,
                    tools,
                    static_data,
                    metadata,
                });

                let ack = WsMessage::RegisterAck {
                    success: true,
                    node_id: node.id.clone(),
                    message: Some(format!("registered {} tools", node.tools.len())),
                };
                self.reply(connection_id, ack).await;
            }
            WsMessage::Unregister { node_id } => {
                if self.registry.unregister(&node_id).is_some() {
                    self.correlator.fail_for_node(&node_id, "node unregistered");
                }
            }
            WsMessage::ToolListUpdate { node_id, tools } => {
                self.registry.update_tools(&node_id, tools);
            }
            WsMessage::StaticDataUpdate { node_id, data } => {
                self.registry.update_static_data(&node_id, data);
            }
            WsMessage::Heartbeat { node_id } => {
                self.registry.touch_heartbeat(&node_id);
            }
            WsMessage::CallResult {
                call_id,
                success,
                output,
                data,
                error,
                duration_ms,
            } => {
                self.correlator.complete(
                    &call_id,
                    CallResult {
                        success,
                        output,
                        data,
                        error,
                        duration_ms,
                    },
                );
            }
            other => {
                tracing::warn!(
                    connection_id = %connection_id,
                    kind = other.kind(),
                    "unexpected inbound message type; ignored"
                );
            }
        }
    }

    /// A transport connection went away. In-flight calls to its nodes fail
    /// with `NodeUnavailable`; the node records and their tools stay, so a
    /// reconnect re-registers them and a missed heartbeat marks them
    /// offline. Returns the number of nodes bound to the connection.
    pub fn connection_closed(&self, connection_id: &str) -> usize {
        let node_ids = self.registry.nodes_on_connection(connection_id);
        let failed: usize = node_ids
            .iter()
            .map(|node_id| self.correlator.fail_for_node(node_id, "connection closed"))
            .sum();
        if !node_ids.is_empty() {
            tracing::info!(
                connection_id = %connection_id,
                nodes = node_ids.len(),
                failed_in_flight = failed,
                "connection closed; nodes await reconnect"
            );
        }
        node_ids.len()
    }

    /// Resolve every in-flight call with `Shutdown` and stop forwarding
    /// events. Returns the number of calls cancelled.
    pub fn shutdown(&self, reason: &str) -> usize {
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
        self.correlator.cancel_all(reason)
    }

    pub fn stats(&self) -> RouterStats {
        let counts = self.registry.counts();
        RouterStats {
            nodes_total: counts.nodes_total,
            nodes_online: counts.nodes_online,
            nodes_offline: counts.nodes_total - counts.nodes_online,
            tools_total: counts.tools_total,
            pending_calls: self.correlator.pending_count(),
        }
    }

    pub fn pending_calls(&self) -> Vec<PendingInfo> {
        self.correlator.snapshot()
    }

    async fn reply(&self, connection_id: &str, msg: WsMessage) {
        let transport = self.transport.read().clone();
        let Some(transport) = transport else {
            tracing::debug!(kind = msg.kind(), "no transport attached; reply dropped");
            return;
        };
        // Bounded so a stalled connection cannot wedge its own reader loop.
        match tokio::time::timeout(self.config.call_timeout(), transport.send_to(connection_id, msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "failed to send reply");
            }
            Err(_) => {
                tracing::warn!(connection_id = %connection_id, "reply dropped; connection queue stalled");
            }
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.get_mut().take() {
            forwarder.abort();
        }
    }
}

fn record_call(
    tool: &str,
    node_id: &str,
    call_id: &str,
    outcome: &Result<CallResult, RouteError>,
    started: Instant,
) {
    let outcome = match outcome {
        Ok(r) if r.success => "success".to_string(),
        Ok(_) => "tool_error".to_string(),
        Err(e) => e.kind().to_string(),
    };
    TraceEvent::CallRouted {
        tool: tool.to_string(),
        node_id: node_id.to_string(),
        call_id: call_id.to_string(),
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();
}
