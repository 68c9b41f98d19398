//! write_file: create or overwrite a file, creating parent directories as needed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, read_existing, str_arg};
use crate::executor::{FileChange, ProposedContent, ToolResult};
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Path of the file to write")),
        );
        properties.insert(
            "content".to_string(),
            ParameterSchema::string(Some("Full new content of the file")),
        );
        ParameterSchema::object(
            None,
            properties,
            vec!["path".to_string(), "content".to_string()],
        )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Write
    }

    fn mutation_target(&self, args: &Value) -> Option<String> {
        str_arg(args, "path").map(String::from)
    }

    fn propose(&self, _before: Option<&str>, args: &Value) -> ProposedContent {
        match str_arg(args, "content") {
            Some(content) => ProposedContent::Content(content.to_string()),
            None => ProposedContent::Unknown,
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(raw) = str_arg(&args, "path") else {
            return ToolResult::err(missing_param_error("path"));
        };
        let Some(content) = str_arg(&args, "content") else {
            return ToolResult::err(missing_param_error("content"));
        };
        let path = ctx.resolve_path(raw);

        let before = match read_existing(&path).await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(e),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(format!("Failed to create directories: {}", e));
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::ok(format!(
                "Wrote {} lines to {}",
                content.lines().count(),
                raw
            ))
            .with_file_change(FileChange::between(raw, before.as_deref(), Some(content))),
            Err(e) => ToolResult::err(format!("Failed to write file: {}", e)),
        }
    }
}
