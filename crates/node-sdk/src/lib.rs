//! `th-node-sdk`: building blocks for ToolHub nodes.
//!
//! A node is any process that connects to the hub over WebSocket,
//! registers the tools and static data it provides, and executes the
//! `call` messages the hub routes to it. This crate handles the
//! connection lifecycle so node authors only write tool handlers.
//!
//! ```text
//!   let mut reg = ToolRegistry::new();
//!   reg.register("translate", "Translate text", Translate);
//!
//!   NodeClientBuilder::new()
//!       .hub_ws_url("ws://hub:3220/v1/nodes/ws")
//!       .node_id("translator-1")
//!       .build()?
//!       .run(reg, shutdown)
//!       .await;
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS
//! 2. Send `register { node_id?, tools, static_data }`
//! 3. Wait for `register_ack`; adopt the hub-assigned `node_id` if none was set
//! 4. Main loop:
//!    - On `call`: dispatch to the registered handler, always answer with `call_result`
//!    - Emit `heartbeat` every `heartbeat_interval`
//! 5. On shutdown: send `unregister`, then close
//! 6. On disconnect: reconnect with jittered exponential back-off, re-registering
//!    under the same `node_id`

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod registry;
pub mod types;

pub use builder::NodeClientBuilder;
pub use client::NodeClient;
pub use reconnect::ReconnectBackoff;
pub use registry::{NodeTool, ToolRegistry};
pub use types::{NodeSdkError, ToolContext, ToolError, ToolResult};

pub use th_protocol::{ToolDescriptor, WsMessage};
