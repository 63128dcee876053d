use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// [observability]
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trace export settings for the hub.
///
/// JSON logs are always written. Spans (call routing, node sessions) are
/// additionally shipped over OTLP/gRPC once an exporter endpoint is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Collector address, e.g. `http://localhost:4317`. Unset or blank
    /// means no exporter.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Reported as the `service.name` resource attribute.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of traces kept, by trace id. Must lie in `0.0..=1.0`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl ObservabilityConfig {
    /// The collector to export to, or `None` when export is off.
    pub fn exporter_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_service_name() -> String {
    "toolhub".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigSeverity};

    #[test]
    fn export_is_off_by_default() {
        let cfg = ObservabilityConfig::default();
        assert_eq!(cfg.exporter_endpoint(), None);
        assert_eq!(cfg.service_name, "toolhub");
        assert_eq!(cfg.sample_rate, 1.0);
    }

    #[test]
    fn blank_endpoint_disables_export() {
        let cfg: ObservabilityConfig = toml::from_str(r#"otlp_endpoint = "   ""#).unwrap();
        assert!(cfg.otlp_endpoint.is_some());
        assert_eq!(cfg.exporter_endpoint(), None);
    }

    #[test]
    fn endpoint_is_trimmed() {
        let cfg: ObservabilityConfig =
            toml::from_str(r#"otlp_endpoint = " http://otel:4317 ""#).unwrap();
        assert_eq!(cfg.exporter_endpoint(), Some("http://otel:4317"));
    }

    #[test]
    fn section_parses_inside_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            [observability]
            otlp_endpoint = "http://localhost:4317"
            service_name = "toolhub-edge"
            sample_rate = 0.25
            "#,
        )
        .unwrap();
        let obs = &cfg.observability;
        assert_eq!(obs.exporter_endpoint(), Some("http://localhost:4317"));
        assert_eq!(obs.service_name, "toolhub-edge");
        assert_eq!(obs.sample_rate, 0.25);
        // Sections left out keep their defaults.
        assert_eq!(cfg.server.port, 3220);
    }

    #[test]
    fn sample_rate_outside_unit_range_is_rejected() {
        for bad in [-0.1, 1.5] {
            let mut cfg = Config::default();
            cfg.observability.sample_rate = bad;
            let issues = cfg.validate();
            assert!(
                issues.iter().any(|i| i.severity == ConfigSeverity::Error
                    && i.field == "observability.sample_rate"),
                "{bad} accepted"
            );
        }
        let mut cfg = Config::default();
        cfg.observability.sample_rate = 0.0;
        assert!(cfg.validate().is_empty());
    }
}
