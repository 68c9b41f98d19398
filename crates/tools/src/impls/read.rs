//! read_file: return a file's text, optionally a line window of it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, str_arg, MAX_FILE_BYTES};
use crate::executor::ToolResult;
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Optionally pass offset (1-based line) and limit (number of lines)."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Path to the file, relative to the working directory")),
        );
        properties.insert(
            "offset".to_string(),
            ParameterSchema::integer(Some("First line to return (1-based)")),
        );
        properties.insert(
            "limit".to_string(),
            ParameterSchema::integer(Some("Maximum number of lines to return")),
        );
        ParameterSchema::object(None, properties, vec!["path".to_string()])
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(raw) = str_arg(&args, "path") else {
            return ToolResult::err(missing_param_error("path"));
        };
        let path = ctx.resolve_path(raw);

        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => return ToolResult::err(format!("Cannot read {}: {}", path.display(), e)),
        };
        if meta.is_dir() {
            return ToolResult::err(format!("{} is a directory; use list_dir", path.display()));
        }
        if meta.len() > MAX_FILE_BYTES {
            return ToolResult::err(format!(
                "{} is too large ({} bytes); read a window with offset/limit on a smaller file",
                path.display(),
                meta.len()
            ));
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolResult::err(format!("Cannot read {}: {}", path.display(), e)),
        };
        let text = String::from_utf8_lossy(&bytes);

        let offset = args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
        let limit = args.get("limit").and_then(|v| v.as_u64()).map(|l| l as usize);

        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return ToolResult::ok("(empty file)");
        }
        if offset > lines.len() {
            return ToolResult::err(format!(
                "offset {} is past the end of the file ({} lines)",
                offset,
                lines.len()
            ));
        }
        let end = limit
            .map(|l| (offset - 1 + l).min(lines.len()))
            .unwrap_or(lines.len());
        let window = lines[offset - 1..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", offset + i, line))
            .collect::<Vec<_>>()
            .join("\n");
        ToolResult::ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::test_helpers::make_test_ctx;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_numbers_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\ngamma\n").unwrap();
        let result = ReadFileTool
            .execute(&make_test_ctx(dir.path()), serde_json::json!({"path": "a.txt"}))
            .await;
        assert!(result.success);
        let out = result.output.unwrap();
        assert!(out.contains("     1\talpha"));
        assert!(out.contains("     3\tgamma"));
    }

    #[tokio::test]
    async fn test_read_window() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "1\n2\n3\n4\n5\n").unwrap();
        let result = ReadFileTool
            .execute(
                &make_test_ctx(dir.path()),
                serde_json::json!({"path": "a.txt", "offset": 2, "limit": 2}),
            )
            .await;
        let out = result.output.unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.starts_with("     2\t2"));
    }

    #[tokio::test]
    async fn test_read_missing_file_and_param() {
        let dir = TempDir::new().unwrap();
        let ctx = make_test_ctx(dir.path());
        let missing = ReadFileTool
            .execute(&ctx, serde_json::json!({"path": "nope.txt"}))
            .await;
        assert!(!missing.success);

        let no_param = ReadFileTool.execute(&ctx, serde_json::json!({})).await;
        assert_eq!(no_param.error.as_deref(), Some("Missing required parameter: path"));
    }

    #[tokio::test]
    async fn test_read_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = ReadFileTool
            .execute(&make_test_ctx(dir.path()), serde_json::json!({"path": "."}))
            .await;
        assert!(result.to_content().contains("is a directory"));
    }
}
