//! run_command: execute a shell command in the working directory.
//!
//! Output is stdout followed by stderr, then an exit-code marker. The
//! process is killed when the timeout elapses or the run is cancelled.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use stepwise_core::context::{ExecutionContext, ToolContext};
use stepwise_llm::types::ParameterSchema;

use super::{missing_param_error, str_arg};
use crate::executor::ToolResult;
use crate::mode::ToolCapability;
use crate::trait_def::Tool;

/// Commands refused outright.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "> /dev/sda",
    "dd if=/dev/zero",
    "mkfs.",
    ":(){ :|:& };:",
    "chmod -R 777 /",
];

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;
/// Raw output cap before the engine's own truncation.
const MAX_OUTPUT_CHARS: usize = 200_000;

pub struct RunCommandTool {
    default_timeout: Duration,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn blocked(command: &str) -> Option<&'static str> {
        let normalized = command.split_whitespace().collect::<Vec<_>>().join(" ");
        BLOCKED_COMMANDS
            .iter()
            .copied()
            .find(|blocked| normalized.contains(blocked))
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn clip(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_CHARS {
        let mut cut = MAX_OUTPUT_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n[output clipped]");
    }
    text
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory and return its output and exit code."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "command".to_string(),
            ParameterSchema::string(Some("The command line to execute")),
        );
        properties.insert(
            "timeout_secs".to_string(),
            ParameterSchema::integer(Some("Timeout in seconds (default 120, max 600)")),
        );
        ParameterSchema::object(None, properties, vec!["command".to_string()])
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Execute
    }

    fn command_text(&self, args: &Value) -> Option<String> {
        str_arg(args, "command").map(String::from)
    }

    fn is_long_running(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let Some(command) = str_arg(&args, "command") else {
            return ToolResult::err(missing_param_error("command"));
        };
        if let Some(pattern) = Self::blocked(command) {
            return ToolResult::err(format!("Command blocked for safety: contains '{}'", pattern));
        }
        let timeout = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .map(|s| Duration::from_secs(s.clamp(1, MAX_TIMEOUT_SECS)))
            .unwrap_or(self.default_timeout);

        let child = shell_command(command)
            .current_dir(ctx.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => return ToolResult::err(format!("Failed to spawn command: {}", e)),
        };

        let output = tokio::select! {
            out = tokio::time::timeout(timeout, child.wait_with_output()) => out,
            _ = ctx.cancellation_token().cancelled() => {
                return ToolResult::err("Command cancelled");
            }
        };
        let output = match output {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return ToolResult::err(format!("Command failed: {}", e)),
            Err(_) => {
                return ToolResult::err(format!(
                    "Command timed out after {}s: {}",
                    timeout.as_secs(),
                    command
                ))
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let mut text = clip(text);
        let code = output.status.code().unwrap_or(-1);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("[exit code: {}]", code));

        if output.status.success() {
            ToolResult::ok(text)
        } else {
            ToolResult {
                success: false,
                output: Some(text.clone()),
                error: Some(text),
                file_change: None,
            }
        }
    }
}
