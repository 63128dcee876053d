//! Periodic liveness sweep over the node registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::NodeRegistry;

pub struct HeartbeatMonitor {
    registry: Arc<NodeRegistry>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<NodeRegistry>, timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            timeout: chrono::Duration::from_std(timeout)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            interval,
        }
    }

    /// Run one sweep as if the clock read `now`. Returns the demoted node ids.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<String> {
        self.registry.sweep_expired(now, self.timeout)
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            tracing::debug!(
                interval_ms = self.interval.as_millis() as u64,
                timeout_ms = self.timeout.num_milliseconds(),
                "heartbeat monitor started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let expired = self.sweep_at(Utc::now());
                        if !expired.is_empty() {
                            tracing::info!(count = expired.len(), "heartbeat sweep demoted nodes");
                        }
                    }
                }
            }
            tracing::debug!("heartbeat monitor stopped");
        })
    }
}
