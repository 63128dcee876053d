pub mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};

use th_domain::config::Config;

/// ToolHub: a distributed tool-call router.
#[derive(Debug, Parser)]
#[command(name = "toolhub", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the hub (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `TH_CONFIG` (or
/// `config.toml` by default). A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("TH_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {config_path}"))?;
    toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from("/definitely/not/here/config.toml").unwrap();
        assert_eq!(config.server.port, 3220);
        assert_eq!(config.router.call_timeout_ms, 60_000);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router]\ncall_timeout_ms = 1500\nobserver_group = \"ops\"").unwrap();
        let config = load_config_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.router.call_timeout_ms, 1500);
        assert_eq!(config.router.observer_group, "ops");
        assert_eq!(config.router.heartbeat_timeout_ms, 90_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router\ncall_timeout_ms = ").unwrap();
        let err = load_config_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }
}
