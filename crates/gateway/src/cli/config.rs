use th_domain::config::{Config, ConfigError, ConfigSeverity};

/// Parse and validate the config, printing any issues.
///
/// Returns `false` when at least one error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    let (report, errors) = render_report(&issues, config_path);
    print!("{report}");

    if errors == 0 {
        let r = &config.router;
        println!(
            "router: call_timeout={}ms heartbeat_timeout={}ms sweep={}ms broadcast={} observers={:?}",
            r.call_timeout_ms,
            r.heartbeat_timeout_ms,
            r.heartbeat_sweep_interval_ms,
            r.broadcast_state_changes,
            r.observer_group,
        );
    }
    errors == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)?;
    print!("{output}");
    Ok(())
}

fn render_report(issues: &[ConfigError], config_path: &str) -> (String, usize) {
    if issues.is_empty() {
        return (format!("Config OK ({config_path})\n"), 0);
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!("{issue}\n"));
    }
    out.push_str(&format!(
        "\n{error_count} error(s), {warning_count} warning(s) in {config_path}\n"
    ));
    (out, error_count)
}
