//! Tool Execution Context
//!
//! Tools never see engine state. They receive a `ToolContext` that carries
//! the identity of the run and call, the working directory the run started
//! in, and the run's cancellation token so long-running tools can stop
//! cooperatively.
//!
//! - `ExecutionContext` trait - read-only identity shared by every scope
//! - `ToolContext` - concrete per-call context handed to `Tool::execute`

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

// ============================================================================
// ExecutionContext Trait
// ============================================================================

/// Read-only identity of the execution scope.
pub trait ExecutionContext: Send + Sync {
    /// Session the run belongs to.
    fn session_id(&self) -> &str;

    /// Identifier of the run (one user turn).
    fn run_id(&self) -> &str;

    /// Directory relative paths are resolved against.
    fn working_dir(&self) -> &Path;
}

// ============================================================================
// ToolContext
// ============================================================================

/// Context for a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    session_id: String,
    run_id: String,
    working_dir: PathBuf,
    tool_call_id: String,
    cancellation_token: CancellationToken,
}

impl ToolContext {
    pub fn new(
        session_id: impl Into<String>,
        run_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            working_dir: working_dir.into(),
            tool_call_id: String::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Attach the id of the tool call being executed.
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = id.into();
        self
    }

    /// Share the run's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolve a tool-supplied path against the working directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        }
    }
}

impl ExecutionContext for ToolContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
