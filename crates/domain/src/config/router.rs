use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router (call routing + liveness)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing and fan-out knobs for the tool-call router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Per-call deadline.
    #[serde(default = "d_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// A node silent for longer than this is marked offline.
    #[serde(default = "d_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Period of the liveness sweep.
    #[serde(default = "d_heartbeat_sweep_interval_ms")]
    pub heartbeat_sweep_interval_ms: u64,
    /// Publish node lifecycle events to listeners and the observer group.
    #[serde(default = "d_true")]
    pub broadcast_state_changes: bool,
    /// Maximum calls in flight across all nodes (0 = unlimited).
    #[serde(default = "d_200")]
    pub max_pending_global: usize,
    /// Maximum calls in flight per node (0 = unlimited).
    #[serde(default = "d_50")]
    pub max_pending_per_node: usize,
    /// Transport group that receives `node_event` messages.
    #[serde(default = "d_observer_group")]
    pub observer_group: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: d_call_timeout_ms(),
            heartbeat_timeout_ms: d_heartbeat_timeout_ms(),
            heartbeat_sweep_interval_ms: d_heartbeat_sweep_interval_ms(),
            broadcast_state_changes: true,
            max_pending_global: d_200(),
            max_pending_per_node: d_50(),
            observer_group: d_observer_group(),
        }
    }
}

impl RouterConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_sweep_interval_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_call_timeout_ms() -> u64 {
    60_000
}
fn d_heartbeat_timeout_ms() -> u64 {
    90_000
}
fn d_heartbeat_sweep_interval_ms() -> u64 {
    30_000
}
fn d_true() -> bool {
    true
}
fn d_200() -> usize {
    200
}
fn d_50() -> usize {
    50
}
fn d_observer_group() -> String {
    "observers".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.call_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(30));
        assert!(cfg.broadcast_state_changes);
        assert_eq!(cfg.observer_group, "observers");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let toml_str = r#"
            call_timeout_ms = 5000
            broadcast_state_changes = false
        "#;
        let cfg: RouterConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.call_timeout_ms, 5000);
        assert!(!cfg.broadcast_state_changes);
        assert_eq!(cfg.heartbeat_timeout_ms, 90_000);
        assert_eq!(cfg.max_pending_per_node, 50);
    }
}
