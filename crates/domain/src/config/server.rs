use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3220")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum inbound WebSocket frame size accepted from a node.
    #[serde(default = "d_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Capacity of each connection's outbound message queue.
    #[serde(default = "d_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_3220(),
            host: d_host(),
            cors: CorsConfig::default(),
            max_message_bytes: d_max_message_bytes(),
            outbound_queue: d_outbound_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

impl CorsConfig {
    /// Resolve the configured origins into a matcher.
    ///
    /// A `"*"` entry anywhere allows every origin. An entry ending in
    /// `:*` (e.g. `http://localhost:*`) accepts that scheme and host on
    /// any numeric port. Blank entries are ignored.
    pub fn policy(&self) -> OriginPolicy {
        let mut exact = Vec::new();
        let mut any_port = Vec::new();
        for entry in self.allowed_origins.iter().map(|o| o.trim()) {
            match entry {
                "" => {}
                "*" => return OriginPolicy::Any,
                _ => match entry.strip_suffix('*') {
                    Some(prefix) if prefix.ends_with(':') => any_port.push(prefix.to_owned()),
                    _ => exact.push(entry.trim_end_matches('/').to_owned()),
                },
            }
        }
        OriginPolicy::Listed { exact, any_port }
    }
}

/// Which browser origins may call the hub's HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    Any,
    Listed {
        exact: Vec<String>,
        /// `scheme://host:` prefixes followed by a port.
        any_port: Vec<String>,
    },
}

impl OriginPolicy {
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::Listed { exact, any_port } => {
                exact.iter().any(|e| e == origin)
                    || any_port.iter().any(|prefix| {
                        origin.strip_prefix(prefix.as_str()).is_some_and(|port| {
                            !port.is_empty()
                                && port.len() <= 5
                                && port.bytes().all(|b| b.is_ascii_digit())
                        })
                    })
            }
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3220() -> u16 {
    3220
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}
fn d_max_message_bytes() -> usize {
    4 * 1024 * 1024
}
fn d_outbound_queue() -> usize {
    64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
