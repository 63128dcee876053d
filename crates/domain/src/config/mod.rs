mod observability;
mod router;
mod server;

pub use observability::*;
pub use router::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.outbound_queue == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.outbound_queue".into(),
                message: "outbound_queue must be greater than 0".into(),
            });
        }

        // Zero durations would make every call or node expire instantly.
        for (field, value) in [
            ("router.call_timeout_ms", self.router.call_timeout_ms),
            ("router.heartbeat_timeout_ms", self.router.heartbeat_timeout_ms),
            (
                "router.heartbeat_sweep_interval_ms",
                self.router.heartbeat_sweep_interval_ms,
            ),
        ] {
            if value == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        if self.router.heartbeat_sweep_interval_ms > self.router.heartbeat_timeout_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "router.heartbeat_sweep_interval_ms".into(),
                message: format!(
                    "sweep interval ({}ms) exceeds heartbeat timeout ({}ms); silent nodes will be detected late",
                    self.router.heartbeat_sweep_interval_ms, self.router.heartbeat_timeout_ms
                ),
            });
        }

        if self.router.broadcast_state_changes && self.router.observer_group.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "router.observer_group".into(),
                message: "empty observer group; node events will reach no connection".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be within 0.0..=1.0".into(),
            });
        }

        if self.server.cors.policy() == OriginPolicy::Any {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        errors
    }
}
