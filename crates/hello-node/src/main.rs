//! Reference "hello-world" node for ToolHub.
//!
//! Registers three tools with the hub and serves calls until Ctrl-C:
//!
//! - `hello`: greet someone, using the configured prefix
//! - `echo` : return the params unchanged
//! - `info` : describe this node (id, uptime, tool names)
//!
//! The greeting prefix is also published as static data under
//! `greeting_prefix`.
//!
//! Usage:
//!   th-hello-node [ws://localhost:3220/v1/nodes/ws]
//!
//! Env vars:
//!   TH_HUB_URL        hub WebSocket URL (the positional argument wins)
//!   TH_NODE_ID        node id (default: assigned by the hub)
//!   TH_HELLO_PREFIX   greeting prefix (default: "Hello")

use std::time::Instant;

use th_node_sdk::{
    NodeClientBuilder, NodeSdkError, NodeTool, ToolContext, ToolError, ToolRegistry, ToolResult,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_HUB_URL: &str = "ws://localhost:3220/v1/nodes/ws";

struct Hello {
    prefix: String,
}

#[async_trait::async_trait]
impl NodeTool for Hello {
    async fn call(&self, _ctx: ToolContext, params: serde_json::Value) -> ToolResult {
        let name = match params.get("name") {
            None | Some(serde_json::Value::Null) => "world",
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.as_str(),
            Some(_) => return Err(ToolError::InvalidArgs("name must be a non-empty string".into())),
        };
        Ok(serde_json::json!({ "greeting": format!("{}, {name}!", self.prefix) }))
    }
}

struct Echo;

#[async_trait::async_trait]
impl NodeTool for Echo {
    async fn call(&self, _ctx: ToolContext, params: serde_json::Value) -> ToolResult {
        Ok(params)
    }
}

struct Info {
    started: Instant,
    tools: Vec<String>,
}

#[async_trait::async_trait]
impl NodeTool for Info {
    async fn call(&self, ctx: ToolContext, _params: serde_json::Value) -> ToolResult {
        Ok(serde_json::json!({
            "node": "th-hello-node",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": self.started.elapsed().as_secs(),
            "tools": self.tools,
            "call_id": ctx.call_id,
        }))
    }
}

fn build_registry(prefix: &str) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register_with_schema(
        "hello",
        "Greet someone",
        serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        }),
        Hello {
            prefix: prefix.to_owned(),
        },
    )
    .register("echo", "Return the params unchanged", Echo);

    let mut tools = reg.tool_names();
    tools.push("info".into());
    tools.sort();
    reg.register(
        "info",
        "Describe this node",
        Info {
            started: Instant::now(),
            tools,
        },
    );
    reg
}

fn hub_url(arg: Option<String>, env: Option<String>) -> String {
    arg.or(env)
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HUB_URL.to_owned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = hub_url(std::env::args().nth(1), std::env::var("TH_HUB_URL").ok());
    let prefix = std::env::var("TH_HELLO_PREFIX").unwrap_or_else(|_| "Hello".into());

    let mut builder = NodeClientBuilder::new()
        .hub_ws_url(url)
        .display_name("Hello Node")
        .static_value("greeting_prefix", prefix.clone())
        .metadata(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }));
    if let Ok(id) = std::env::var("TH_NODE_ID") {
        builder = builder.node_id(id);
    }
    let client = builder.build()?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
        }
        signal.cancel();
    });

    match client.run(build_registry(&prefix), shutdown).await {
        Ok(()) | Err(NodeSdkError::Shutdown) => {
            tracing::info!("hello node stopped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tool: &str) -> ToolContext {
        ToolContext {
            call_id: "t-1".into(),
            tool_name: tool.into(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn hello_uses_prefix() {
        let reg = build_registry("Bonjour");
        let hello = reg.get("hello").unwrap();

        let out = hello.call(ctx("hello"), serde_json::json!({"name": "Ada"})).await.unwrap();
        assert_eq!(out["greeting"], "Bonjour, Ada!");

        let out = hello.call(ctx("hello"), serde_json::json!({})).await.unwrap();
        assert_eq!(out["greeting"], "Bonjour, world!");

        let err = hello.call(ctx("hello"), serde_json::json!({"name": 3})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn info_lists_every_tool() {
        let reg = build_registry("Hi");
        assert_eq!(reg.tool_names(), vec!["echo", "hello", "info"]);
        let out = reg.get("info").unwrap().call(ctx("info"), serde_json::Value::Null).await.unwrap();
        assert_eq!(out["tools"], serde_json::json!(["echo", "hello", "info"]));
        assert_eq!(out["call_id"], "t-1");
    }

    #[test]
    fn hub_url_precedence() {
        assert_eq!(hub_url(None, None), DEFAULT_HUB_URL);
        assert_eq!(hub_url(None, Some("ws://env".into())), "ws://env");
        assert_eq!(hub_url(Some("ws://arg".into()), Some("ws://env".into())), "ws://arg");
        assert_eq!(hub_url(Some(" ".into()), None), DEFAULT_HUB_URL);
    }
}
