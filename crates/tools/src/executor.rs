//! Tool Result Types
//!
//! The structured outcome of one tool call. Results are immutable once
//! built: the engine appends them to the context log and echoes them back
//! to the model as tool-result messages.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

/// Kind of filesystem mutation a tool performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Modify,
    Delete,
}

impl FileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperation::Create => "create",
            FileOperation::Modify => "modify",
            FileOperation::Delete => "delete",
        }
    }
}

/// Side-effect payload attached to results of file-mutating tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub operation: FileOperation,
    /// Unified diff from the previous content to the new content
    pub diff: String,
}

impl FileChange {
    /// Build a change record, computing the diff between `before` and `after`.
    ///
    /// A missing `before` is a create; a missing `after` is a delete.
    pub fn between(path: impl Into<String>, before: Option<&str>, after: Option<&str>) -> Self {
        let path = path.into();
        let operation = match (before, after) {
            (None, _) => FileOperation::Create,
            (Some(_), None) => FileOperation::Delete,
            (Some(_), Some(_)) => FileOperation::Modify,
        };
        let diff = unified_diff(&path, before.unwrap_or(""), after.unwrap_or(""));
        Self {
            path,
            operation,
            diff,
        }
    }
}

/// Content a file-mutating call would leave behind, known before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedContent {
    Content(String),
    Delete,
    /// The tool cannot predict its effect
    Unknown,
}

/// Context lines around each change in rendered diffs. Hunks shown to
/// approvers are grouped with the same radius.
pub const DIFF_CONTEXT_RADIUS: usize = 3;

/// Render a unified diff with `a/` and `b/` headers.
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_RADIUS)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string()
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_change: Option<FileChange>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            file_change: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            file_change: None,
        }
    }

    /// Attach the file mutation this call performed.
    pub fn with_file_change(mut self, change: FileChange) -> Self {
        self.file_change = Some(change);
        self
    }

    /// Convert to string for LLM consumption
    pub fn to_content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}
