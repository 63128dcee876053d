//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! Integration tests use the same two functions to boot a hub without the
//! CLI.

use std::sync::Arc;
use std::time::Instant;

use th_domain::config::{Config, ConfigSeverity};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::nodes::router::Router;
use crate::nodes::transport::{ConnectionHub, Transport};
use crate::state::AppState;

/// Validate config, build the router and connection hub, and return a
/// fully-wired [`AppState`].
///
/// Must run inside a tokio runtime: attaching the transport starts the
/// node-event forwarder.
pub fn build_app_state(config: Arc<Config>, shutdown: CancellationToken) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Transport ────────────────────────────────────────────────────
    let hub = Arc::new(ConnectionHub::new(config.server.outbound_queue));

    // ── Router ───────────────────────────────────────────────────────
    let router = Arc::new(Router::new(config.router.clone()));
    router.attach_transport(hub.clone() as Arc<dyn Transport>);
    tracing::info!(
        call_timeout_ms = config.router.call_timeout_ms,
        heartbeat_timeout_ms = config.router.heartbeat_timeout_ms,
        broadcast = config.router.broadcast_state_changes,
        observer_group = %config.router.observer_group,
        "router ready"
    );

    Ok(AppState {
        config,
        router,
        hub,
        shutdown,
        started_at: Instant::now(),
    })
}

/// Spawn the long-running background tasks (heartbeat sweep).
///
/// They stop when `state.shutdown` is cancelled.
pub fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let monitor = state.router.heartbeat_monitor().spawn(state.shutdown.clone());
    tracing::info!("background tasks spawned");
    vec![monitor]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_config_aborts_boot() {
        let mut config = Config::default();
        config.router.heartbeat_timeout_ms = 0;
        let err = build_app_state(Arc::new(config), CancellationToken::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[tokio::test]
    async fn default_config_boots_and_tasks_stop_on_shutdown() {
        let shutdown = CancellationToken::new();
        let state = build_app_state(Arc::new(Config::default()), shutdown.clone()).unwrap();
        assert_eq!(state.router.stats().nodes_total, 0);

        let handles = spawn_background_tasks(&state);
        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
