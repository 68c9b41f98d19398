//! list_dir: list a directory, one entry per line, directories suffixed `/`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::str_arg;
use crate::executor::ToolResult;
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

const MAX_ENTRIES: usize = 500;

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (defaults to the working directory)."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Directory to list")),
        );
        ParameterSchema::object(None, properties, vec![])
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Read
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let path = ctx.resolve_path(str_arg(&args, "path").unwrap_or("."));
        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return ToolResult::err(format!("Cannot list {}: {}", path.display(), e)),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push(if is_dir { format!("{}/", name) } else { name });
                }
                Ok(None) => break,
                Err(e) => return ToolResult::err(format!("Cannot list {}: {}", path.display(), e)),
            }
        }
        entries.sort();

        if entries.is_empty() {
            return ToolResult::ok("(empty directory)");
        }
        let total = entries.len();
        let mut out = entries
            .into_iter()
            .take(MAX_ENTRIES)
            .collect::<Vec<_>>()
            .join("\n");
        if total > MAX_ENTRIES {
            out.push_str(&format!("\n... {} more entries", total - MAX_ENTRIES));
        }
        ToolResult::ok(out)
    }
}
