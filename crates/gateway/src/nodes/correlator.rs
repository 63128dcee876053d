//! Correlates outbound `call` messages with their `call_result` replies.
//!
//! Every in-flight call owns one entry in the pending map. Whoever removes
//! the entry under the lock (result, timer, cancellation, shutdown) resolves
//! it; everyone else finds nothing and does nothing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use th_domain::RouteError;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a node reported for a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

pub type CallOutcome = Result<CallResult, RouteError>;

/// Read-only view of an in-flight call.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInfo {
    pub call_id: String,
    pub tool_name: String,
    pub node_id: String,
    pub params: Value,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub elapsed_ms: u64,
}

struct PendingEntry {
    tool_name: String,
    node_id: String,
    params: Value,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    started: Instant,
    tx: oneshot::Sender<CallOutcome>,
    timer: Option<AbortHandle>,
}

impl PendingEntry {
    fn resolve(self, outcome: CallOutcome) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The waiter may have gone away; nothing left to tell it.
        let _ = self.tx.send(outcome);
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Handle returned by [`CallCorrelator::begin_call`]; resolves exactly once.
pub struct PendingCall {
    call_id: String,
    rx: oneshot::Receiver<CallOutcome>,
}

impl PendingCall {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }
}

impl Future for PendingCall {
    type Output = CallOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CallOutcome> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                Err(RouteError::Cancelled {
                    reason: "pending entry dropped".into(),
                })
            })
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CallCorrelator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct CallCorrelator {
    /// Map of call_id → pending sender, owning node, and timer.
    pending: Arc<Mutex<HashMap<String, PendingEntry>>>,
    /// Maximum pending calls globally (0 = unlimited).
    max_pending_global: usize,
    /// Maximum pending calls per node (0 = unlimited).
    max_pending_per_node: usize,
}

impl CallCorrelator {
    pub fn new(max_pending_global: usize, max_pending_per_node: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            max_pending_global,
            max_pending_per_node,
        }
    }

    /// Register a new in-flight call and arm its deadline timer.
    ///
    /// Fails with `PendingLimit` when a bound is reached; nothing is stored
    /// in that case.
    pub fn begin_call(
        &self,
        tool_name: &str,
        node_id: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<PendingCall, RouteError> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let now = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        {
            let mut pending = self.pending.lock();
            if self.max_pending_global > 0 && pending.len() >= self.max_pending_global {
                return Err(RouteError::PendingLimit {
                    message: format!(
                        "global pending limit reached ({} calls in flight)",
                        pending.len()
                    ),
                });
            }
            if self.max_pending_per_node > 0 {
                let node_count = pending.values().filter(|p| p.node_id == node_id).count();
                if node_count >= self.max_pending_per_node {
                    return Err(RouteError::PendingLimit {
                        message: format!(
                            "per-node pending limit reached ({node_count} calls in flight for node {node_id})"
                        ),
                    });
                }
            }

            let prev = pending.insert(
                call_id.clone(),
                PendingEntry {
                    tool_name: tool_name.to_string(),
                    node_id: node_id.to_string(),
                    params,
                    created_at: now,
                    deadline,
                    started: Instant::now(),
                    tx,
                    timer: None,
                },
            );
            debug_assert!(prev.is_none(), "call_id collision: {call_id}");
        }

        // Arm the timer only after the entry exists, then attach its handle
        // if nobody resolved the call in between.
        let pending = Arc::clone(&self.pending);
        let timer_id = call_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let entry = pending.lock().remove(&timer_id);
            if let Some(mut entry) = entry {
                entry.timer = None;
                let elapsed_ms = entry.elapsed_ms();
                tracing::warn!(
                    call_id = %timer_id,
                    tool = %entry.tool_name,
                    node_id = %entry.node_id,
                    elapsed_ms,
                    "tool call timed out"
                );
                let tool = entry.tool_name.clone();
                entry.resolve(Err(RouteError::CallTimeout { tool, elapsed_ms }));
            }
        });
        if let Some(entry) = self.pending.lock().get_mut(&call_id) {
            entry.timer = Some(timer.abort_handle());
        }

        Ok(PendingCall { call_id, rx })
    }

    /// Resolve a call with the node's result. Returns `false` for an unknown,
    /// late, or duplicate `call_id`.
    pub fn complete(&self, call_id: &str, result: CallResult) -> bool {
        let entry = self.pending.lock().remove(call_id);
        match entry {
            Some(entry) => {
                tracing::debug!(
                    call_id = %call_id,
                    node_id = %entry.node_id,
                    success = result.success,
                    elapsed_ms = entry.elapsed_ms(),
                    "call completed"
                );
                entry.resolve(Ok(result));
                true
            }
            None => {
                tracing::warn!(
                    call_id = %call_id,
                    "received call_result for unknown call (duplicate or late)"
                );
                false
            }
        }
    }

    /// Resolve a call early with `Cancelled`.
    pub fn cancel(&self, call_id: &str, reason: &str) -> bool {
        let entry = self.pending.lock().remove(call_id);
        match entry {
            Some(entry) => {
                tracing::debug!(call_id = %call_id, reason = %reason, "call cancelled");
                entry.resolve(Err(RouteError::Cancelled {
                    reason: reason.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    /// Resolve every pending call with `Shutdown`. Returns how many there were.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            entry.resolve(Err(RouteError::Shutdown {
                reason: reason.to_string(),
            }));
        }
        if count > 0 {
            tracing::info!(cancelled = count, reason = %reason, "cancelled all pending calls");
        }
        count
    }

    /// Fail all pending calls targeting `node_id` with `NodeUnavailable`.
    /// Returns the number of calls failed.
    pub fn fail_for_node(&self, node_id: &str, reason: &str) -> usize {
        let failed: Vec<PendingEntry> = {
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.node_id == node_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = failed.len();
        for entry in failed {
            let tool = entry.tool_name.clone();
            entry.resolve(Err(RouteError::NodeUnavailable {
                tool,
                node_id: node_id.to_string(),
            }));
        }

        if count > 0 {
            tracing::warn!(
                node_id = %node_id,
                failed_calls = count,
                reason = %reason,
                "failed in-flight calls for node"
            );
        }
        count
    }

    /// Number of pending (in-flight) calls.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let pending = self.pending.lock();
        let mut calls: Vec<PendingInfo> = pending
            .iter()
            .map(|(id, p)| PendingInfo {
                call_id: id.clone(),
                tool_name: p.tool_name.clone(),
                node_id: p.node_id.clone(),
                params: p.params.clone(),
                created_at: p.created_at,
                deadline: p.deadline,
                elapsed_ms: p.elapsed_ms(),
            })
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        calls
    }
}
