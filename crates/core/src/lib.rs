//! Stepwise Core
//!
//! Foundational types for the Stepwise workspace. This crate has no
//! knowledge of the engine, of LLM providers or of concrete tools.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `context` - Tool execution context (`ExecutionContext`, `ToolContext`)
//! - `streaming` - Provider-agnostic stream events (`UnifiedStreamEvent`)

pub mod context;
pub mod error;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Context ────────────────────────────────────────────────────────────
pub use context::{ExecutionContext, ToolContext};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::UnifiedStreamEvent;
