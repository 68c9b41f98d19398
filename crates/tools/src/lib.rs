//! Stepwise Tools
//!
//! The tool side of the engine:
//! - `ToolResult` / `FileChange` - structured execution results
//! - `AgentMode` / `ToolCapability` - per-mode availability rules
//! - `Tool` trait, `ToolRegistry`, `FunctionTool` - registration and dispatch
//! - `impls` - the built-in toolset (file I/O, shell, HTTP)

pub mod executor;
pub mod impls;
pub mod mode;
pub mod trait_def;

pub use executor::{
    unified_diff, FileChange, FileOperation, ProposedContent, ToolResult, DIFF_CONTEXT_RADIUS,
};
pub use impls::{builtin_registry, register_builtin_tools};
pub use mode::{AgentMode, ToolCapability};
pub use trait_def::{FunctionTool, Tool, ToolFuture, ToolRegistry};
