//! edit_file: replace an exact string in a file.
//!
//! `old_string` must match exactly once unless `replace_all` is set, so the
//! model cannot silently edit the wrong occurrence.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use stepwise_core::context::ToolContext;
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, read_existing, str_arg};
use crate::executor::{FileChange, ProposedContent, ToolResult};
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

pub struct EditFileTool;

/// Apply the replacement, returning the new text and the replaced count.
fn apply_edit(
    before: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
    label: &str,
) -> Result<(String, usize), String> {
    if old_string.is_empty() {
        return Err("old_string must not be empty".to_string());
    }
    if old_string == new_string {
        return Err("old_string and new_string are identical".to_string());
    }
    let occurrences = before.matches(old_string).count();
    if occurrences == 0 {
        return Err(format!("old_string not found in {}", label));
    }
    if occurrences > 1 && !replace_all {
        return Err(format!(
            "old_string appears {} times in {}; add context or set replace_all",
            occurrences, label
        ));
    }
    if replace_all {
        Ok((before.replace(old_string, new_string), occurrences))
    } else {
        Ok((before.replacen(old_string, new_string, 1), 1))
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace old_string with new_string in a file. old_string must be unique unless replace_all is true."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "path".to_string(),
            ParameterSchema::string(Some("Path of the file to edit")),
        );
        properties.insert(
            "old_string".to_string(),
            ParameterSchema::string(Some("Exact text to replace")),
        );
        properties.insert(
            "new_string".to_string(),
            ParameterSchema::string(Some("Replacement text")),
        );
        properties.insert(
            "replace_all".to_string(),
            ParameterSchema::boolean(Some("Replace every occurrence")),
        );
        ParameterSchema::object(
            None,
            properties,
            vec![
                "path".to_string(),
                "old_string".to_string(),
                "new_string".to_string(),
            ],
        )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Write
    }

    fn mutation_target(&self, args: &Value) -> Option<String> {
        str_arg(args, "path").map(String::from)
    }

    fn propose(&self, before: Option<&str>, args: &Value) -> ProposedContent {
        let (Some(before), Some(old_string), Some(new_string)) = (
            before,
            str_arg(args, "old_string"),
            str_arg(args, "new_string"),
        ) else {
            return ProposedContent::Unknown;
        };
        let replace_all = args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        match apply_edit(before, old_string, new_string, replace_all, "file") {
            Ok((after, _)) => ProposedContent::Content(after),
            Err(_) => ProposedContent::Unknown,
        }
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(raw) = str_arg(&args, "path") else {
            return ToolResult::err(missing_param_error("path"));
        };
        let Some(old_string) = str_arg(&args, "old_string") else {
            return ToolResult::err(missing_param_error("old_string"));
        };
        let Some(new_string) = str_arg(&args, "new_string") else {
            return ToolResult::err(missing_param_error("new_string"));
        };
        let replace_all = args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let path = ctx.resolve_path(raw);
        let before = match read_existing(&path).await {
            Ok(Some(text)) => text,
            Ok(None) => return ToolResult::err(format!("File not found: {}", raw)),
            Err(e) => return ToolResult::err(e),
        };

        let (after, replaced) = match apply_edit(&before, old_string, new_string, replace_all, raw) {
            Ok(edit) => edit,
            Err(e) => return ToolResult::err(e),
        };

        match tokio::fs::write(&path, &after).await {
            Ok(()) => ToolResult::ok(format!("Replaced {} occurrence(s) in {}", replaced, raw))
                .with_file_change(FileChange::between(raw, Some(&before), Some(&after))),
            Err(e) => ToolResult::err(format!("Failed to write file: {}", e)),
        }
    }
}
