//! delete_file: remove a single file.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, read_existing, str_arg};
use crate::executor::{FileChange, ProposedContent, ToolResult};
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file. Directories are not removed."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Path of the file to delete")),
        );
        ParameterSchema::object(None, properties, vec!["path".to_string()])
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Write
    }

    fn mutation_target(&self, args: &Value) -> Option<String> {
        str_arg(args, "path").map(String::from)
    }

    fn propose(&self, _before: Option<&str>, _args: &Value) -> ProposedContent {
        ProposedContent::Delete
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(raw) = str_arg(&args, "path") else {
            return ToolResult::err(missing_param_error("path"));
        };
        let path = ctx.resolve_path(raw);
        if path.is_dir() {
            return ToolResult::err(format!("{} is a directory", raw));
        }
        let before = match read_existing(&path).await {
            Ok(Some(text)) => text,
            Ok(None) => return ToolResult::err(format!("File not found: {}", raw)),
            Err(e) => return ToolResult::err(e),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => ToolResult::ok(format!("Deleted {}", raw))
                .with_file_change(FileChange::between(raw, Some(&before), None)),
            Err(e) => ToolResult::err(format!("Failed to delete {}: {}", raw, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FileOperation;
    use crate::impls::test_helpers::make_test_ctx;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_delete_existing_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tmp.log"), "line\n").unwrap();
        let result = DeleteFileTool
            .execute(&make_test_ctx(dir.path()), serde_json::json!({"path": "tmp.log"}))
            .await;
        assert!(result.success);
        assert!(!dir.path().join("tmp.log").exists());
        assert_eq!(result.file_change.unwrap().operation, FileOperation::Delete);
    }

    #[tokio::test]
    async fn test_delete_refuses_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let result = DeleteFileTool
            .execute(&make_test_ctx(dir.path()), serde_json::json!({"path": "sub"}))
            .await;
        assert!(!result.success);
        assert!(dir.path().join("sub").exists());
    }
}
