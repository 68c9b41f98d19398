//! Bookkeeping Tools
//!
//! Checklist tools the engine answers itself instead of dispatching to the
//! registry. They are offered to the model whenever the agent mode allows
//! `ToolCapability::Bookkeeping` and never enter the context log.

use std::collections::HashMap;

use serde_json::Value;

use stepwise_llm::{ParameterSchema, ToolCall, ToolDefinition};
use stepwise_tools::ToolResult;

use crate::services::checklist::ChecklistTracker;

pub const PLAN_TASKS: &str = "plan_tasks";
pub const COMPLETE_TASK: &str = "complete_task";
pub const FAIL_TASK: &str = "fail_task";
pub const SKIP_TASK: &str = "skip_task";

pub fn is_bookkeeping(name: &str) -> bool {
    matches!(name, PLAN_TASKS | COMPLETE_TASK | FAIL_TASK | SKIP_TASK)
}

fn id_and_note(note_key: &str, note_desc: &str) -> ParameterSchema {
    let mut properties = HashMap::new();
    properties.insert(
        "id".to_string(),
        ParameterSchema::integer(Some("Checklist item id")),
    );
    properties.insert(note_key.to_string(), ParameterSchema::string(Some(note_desc)));
    ParameterSchema::object(None, properties, vec!["id".to_string()])
}

pub fn definitions() -> Vec<ToolDefinition> {
    let mut plan = HashMap::new();
    plan.insert(
        "tasks".to_string(),
        ParameterSchema::array(
            Some("Ordered task descriptions"),
            ParameterSchema::string(None),
        ),
    );
    plan.insert(
        "goal".to_string(),
        ParameterSchema::string(Some("Restated goal; defaults to the user's request")),
    );

    vec![
        ToolDefinition {
            name: PLAN_TASKS.to_string(),
            description: "Replace the checklist with an ordered list of tasks.".to_string(),
            input_schema: ParameterSchema::object(None, plan, vec!["tasks".to_string()]),
        },
        ToolDefinition {
            name: COMPLETE_TASK.to_string(),
            description: "Mark a checklist item completed.".to_string(),
            input_schema: id_and_note("note", "How the item was verified"),
        },
        ToolDefinition {
            name: FAIL_TASK.to_string(),
            description: "Mark a checklist item failed.".to_string(),
            input_schema: id_and_note("reason", "Why it failed"),
        },
        ToolDefinition {
            name: SKIP_TASK.to_string(),
            description: "Mark a checklist item skipped.".to_string(),
            input_schema: id_and_note("reason", "Why it is no longer needed"),
        },
    ]
}

/// Result of one bookkeeping call.
#[derive(Debug, Clone)]
pub struct BookkeepingOutcome {
    pub result: ToolResult,
    /// The checklist was replaced
    pub planned: bool,
    /// The checklist changed at all
    pub changed: bool,
}

impl BookkeepingOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            result: ToolResult::err(error),
            planned: false,
            changed: false,
        }
    }
}

fn item_id(args: &Value) -> Option<u32> {
    match args.get("id")? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn note(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Apply a bookkeeping call to `checklist`.
pub fn apply(checklist: &mut ChecklistTracker, run_goal: &str, call: &ToolCall) -> BookkeepingOutcome {
    let args = &call.arguments;
    match call.name.as_str() {
        PLAN_TASKS => {
            let Some(tasks) = args.get("tasks").and_then(|v| v.as_array()) else {
                return BookkeepingOutcome::failed("Missing required parameter: tasks");
            };
            let tasks: Vec<String> = tasks
                .iter()
                .filter_map(|t| t.as_str())
                .map(String::from)
                .collect();
            let goal = note(args, "goal").unwrap_or_else(|| run_goal.to_string());
            checklist.set_goal(goal, &tasks);
            if checklist.is_empty() {
                return BookkeepingOutcome::failed("plan_tasks needs at least one non-empty task");
            }
            BookkeepingOutcome {
                result: ToolResult::ok(format!(
                    "Checklist set with {} item(s):\n{}",
                    checklist.len(),
                    checklist.render()
                )),
                planned: true,
                changed: true,
            }
        }
        COMPLETE_TASK | FAIL_TASK | SKIP_TASK => {
            let Some(id) = item_id(args) else {
                return BookkeepingOutcome::failed("Missing required parameter: id");
            };
            let outcome = match call.name.as_str() {
                COMPLETE_TASK => checklist.mark_completed(id, note(args, "note")),
                FAIL_TASK => checklist.mark_failed(id, note(args, "reason")),
                _ => checklist.mark_skipped(id, note(args, "reason")),
            };
            match outcome {
                Ok(()) => BookkeepingOutcome {
                    result: ToolResult::ok(format!(
                        "Item {} updated. Progress: {}%",
                        id,
                        checklist.progress_percent()
                    )),
                    planned: false,
                    changed: true,
                },
                Err(e) => BookkeepingOutcome::failed(e.to_string()),
            }
        }
        other => BookkeepingOutcome::failed(format!("Unknown bookkeeping tool: {}", other)),
    }
}
