//! Tool Trait and Registry
//!
//! The fixed toolset contract: every tool implements `Tool`, is registered
//! by name in a `ToolRegistry`, and is gated per `AgentMode` through its
//! declared `ToolCapability`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stepwise_core::context::ToolContext;
use stepwise_llm::provider::LlmProvider;
use stepwise_llm::types::{ParameterSchema, ToolDefinition};

use crate::executor::{ProposedContent, ToolResult};
use crate::mode::{AgentMode, ToolCapability};

/// Unified tool interface.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool (e.g. "read_file", "run_command")
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does
    fn description(&self) -> &str;

    /// JSON schema describing the tool's input parameters
    fn parameters_schema(&self) -> ParameterSchema;

    /// What the tool does to the world; drives per-mode availability.
    fn capability(&self) -> ToolCapability;

    /// Path this call would create, modify or delete, if any.
    ///
    /// Tools that return `Some` are routed through approval and the file
    /// lock coordinator before they run.
    fn mutation_target(&self, _args: &Value) -> Option<String> {
        None
    }

    /// Predict the file content this call would produce from `before`.
    ///
    /// Drives the approval diff. `before` is `None` when the file is absent.
    fn propose(&self, _before: Option<&str>, _args: &Value) -> ProposedContent {
        ProposedContent::Unknown
    }

    /// Whether this tool runs shell-like commands (feeds stuck detection).
    fn command_text(&self, _args: &Value) -> Option<String> {
        None
    }

    fn is_long_running(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult;
}

/// Registry of available tools.
///
/// Lookup is by name; iteration follows registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. If a tool with the same name already exists, it is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name. Returns the removed tool, or None if not found.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.order.retain(|n| n != name);
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether `name` exists and its capability is allowed in `mode`.
    pub fn is_available(&self, name: &str, mode: AgentMode) -> bool {
        self.tools
            .get(name)
            .map(|tool| mode.allows(tool.capability()))
            .unwrap_or(false)
    }

    /// All tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| to_definition(tool.as_ref()))
            .collect()
    }

    /// Definitions of the tools usable in `mode`.
    pub fn definitions_for_mode(&self, mode: AgentMode) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .filter(|tool| mode.allows(tool.capability()))
            .map(|tool| to_definition(tool.as_ref()))
            .collect()
    }

    /// Schemas to send to `provider` in `mode`.
    ///
    /// Providers without tool support get none.
    pub fn schemas(&self, mode: AgentMode, provider: &dyn LlmProvider) -> Vec<ToolDefinition> {
        if !provider.supports_tools() {
            return Vec::new();
        }
        self.definitions_for_mode(mode)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name.
    ///
    /// Returns `ToolResult::err` if the tool is not found.
    pub async fn execute(&self, name: &str, ctx: &ToolContext, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.execute(ctx, args).await,
            None => ToolResult::err(format!("Unknown tool: {}", name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.parameters_schema(),
    }
}

// ── FunctionTool ─────────────────────────────────────────────────────

/// Boxed future returned by a `FunctionTool` handler.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult> + Send + 'a>>;

/// Async handler used by `FunctionTool`.
pub type FunctionToolHandler = Box<dyn Fn(&ToolContext, Value) -> ToolFuture<'_> + Send + Sync>;

/// A tool created from an async closure.
///
/// ```ignore
/// let tool = FunctionTool::new(
///     "echo",
///     "Echoes the input",
///     ParameterSchema::object(None, HashMap::new(), vec![]),
///     ToolCapability::Read,
///     |_ctx, args| Box::pin(async move {
///         ToolResult::ok(args["message"].as_str().unwrap_or("(empty)"))
///     }),
/// );
/// ```
pub struct FunctionTool {
    tool_name: String,
    tool_description: String,
    schema: ParameterSchema,
    capability: ToolCapability,
    handler: FunctionToolHandler,
    target_key: Option<String>,
    command_key: Option<String>,
}

impl FunctionTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        capability: ToolCapability,
        handler: F,
    ) -> Self
    where
        F: Fn(&ToolContext, Value) -> ToolFuture<'_> + Send + Sync + 'static,
    {
        Self {
            tool_name: name.into(),
            tool_description: description.into(),
            schema,
            capability,
            handler: Box::new(handler),
            target_key: None,
            command_key: None,
        }
    }

    /// Treat the string argument `key` as the path this tool mutates.
    pub fn with_mutation_target(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    /// Treat the string argument `key` as the shell command this tool runs.
    pub fn with_command_arg(mut self, key: impl Into<String>) -> Self {
        self.command_key = Some(key.into());
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.tool_description
    }

    fn parameters_schema(&self) -> ParameterSchema {
        self.schema.clone()
    }

    fn capability(&self) -> ToolCapability {
        self.capability
    }

    fn mutation_target(&self, args: &Value) -> Option<String> {
        let key = self.target_key.as_deref()?;
        args.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    fn command_text(&self, args: &Value) -> Option<String> {
        let key = self.command_key.as_deref()?;
        args.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        (self.handler)(ctx, args).await
    }
}
