//! Tool registry: maps tool names to handlers and their advertised
//! descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use th_protocol::ToolDescriptor;

use crate::types::{ToolContext, ToolResult};

/// Implement this trait to handle calls routed from the hub.
///
/// # Example
///
/// ```rust,no_run
/// use th_node_sdk::{NodeTool, ToolContext, ToolResult};
///
/// struct PingTool;
///
/// #[async_trait::async_trait]
/// impl NodeTool for PingTool {
///     async fn call(&self, _ctx: ToolContext, _params: serde_json::Value) -> ToolResult {
///         Ok(serde_json::json!({ "pong": true }))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait NodeTool: Send + Sync + 'static {
    async fn call(&self, ctx: ToolContext, params: serde_json::Value) -> ToolResult;
}

#[derive(Clone)]
struct Entry {
    handler: Arc<dyn NodeTool>,
    descriptor: ToolDescriptor,
}

/// Registry of tool handlers.
///
/// Names are normalized to lowercase; the hub routes on the advertised
/// (lowercase) name and the SDK dispatches case-insensitively.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under an exact name.
    ///
    /// Returns `&mut Self` for method chaining.
    pub fn register<T: NodeTool>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        tool: T,
    ) -> &mut Self {
        self.insert(name.into(), description.into(), None, Arc::new(tool))
    }

    /// Register a tool with a JSON Schema for its parameters.
    pub fn register_with_schema<T: NodeTool>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        tool: T,
    ) -> &mut Self {
        self.insert(name.into(), description.into(), Some(schema), Arc::new(tool))
    }

    /// Register a pre-wrapped tool handler.
    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        tool: Arc<dyn NodeTool>,
    ) -> &mut Self {
        self.insert(name.into(), description.into(), None, tool)
    }

    fn insert(
        &mut self,
        name: String,
        description: String,
        schema: Option<serde_json::Value>,
        handler: Arc<dyn NodeTool>,
    ) -> &mut Self {
        let name = name.to_ascii_lowercase();
        let descriptor = ToolDescriptor {
            name: name.clone(),
            description,
            parameter_schema: schema,
        };
        self.tools.insert(name, Entry { handler, descriptor });
        self
    }

    /// All registered tool names (sorted).
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Descriptors advertised in `register`, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> =
            self.tools.values().map(|e| e.descriptor.clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Look up a handler by tool name (case-insensitive).
    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn NodeTool>> {
        self.tools
            .get(&tool_name.to_ascii_lowercase())
            .map(|e| e.handler.clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
