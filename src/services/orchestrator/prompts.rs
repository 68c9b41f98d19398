//! Prompt Builders
//!
//! System prompt for the tool loop and the one-shot decision prompts used
//! for reflection, stuck checks and verification. Decision prompts always
//! ask for a single JSON object.

use std::path::Path;

use stepwise_tools::AgentMode;

use crate::models::checklist::TaskChecklistItem;
use crate::models::profile::Profile;

pub struct SystemPromptInput<'a> {
    pub goal: &'a str,
    pub working_dir: &'a Path,
    pub mode: AgentMode,
    pub profile: Profile,
    pub checklist: &'a str,
    pub current_task: Option<&'a TaskChecklistItem>,
    pub context_log: &'a str,
}

/// The static part of the system prompt, without the context log.
pub fn system_prompt_header(input: &SystemPromptInput<'_>) -> String {
    let mut prompt = format!(
        "You are an autonomous coding agent working in {}.\n\
Mode: {}. Profile: {}.\n{}\n\n\
Work toward the goal with the tools provided. Break multi-step work into a checklist \
with plan_tasks and report progress with complete_task, fail_task or skip_task. \
When the current work is finished, reply with plain text and no tool calls.\n\n\
## Goal\n{}\n",
        input.working_dir.display(),
        input.mode.as_str(),
        input.profile,
        input.profile.prompt_addition(),
        input.goal.trim()
    );
    if !input.checklist.trim().is_empty() {
        prompt.push_str(&format!("\n## Checklist\n{}", input.checklist));
    }
    if let Some(task) = input.current_task {
        prompt.push_str(&format!(
            "\n## Current task\n{}. {}\n",
            task.id, task.description
        ));
    }
    prompt
}

pub fn system_prompt(input: &SystemPromptInput<'_>) -> String {
    let mut prompt = system_prompt_header(input);
    if !input.context_log.trim().is_empty() {
        prompt.push_str(&format!("\n## Activity log\n{}\n", input.context_log));
    }
    prompt
}

pub const REFLECTION_SYSTEM_PROMPT: &str = "You review the progress of a coding agent. \
Reply with a single JSON object: {\"progress_percent\": <0-100>, \"on_track\": <bool>, \
\"new_approach\": <string or null>}.";

pub fn reflection_prompt(goal: &str, checklist: &str, log_tail: &str, focus: &str) -> String {
    format!(
        "Goal: {}\nFocus on {}.\n\nChecklist:\n{}\nRecent activity:\n{}",
        goal.trim(),
        focus,
        if checklist.trim().is_empty() { "(none)\n" } else { checklist },
        log_tail
    )
}

pub const STUCK_SYSTEM_PROMPT: &str = "A coding agent keeps repeating near-identical commands. \
Decide whether it is stuck. Reply with a single JSON object: {\"stuck\": <bool>, \
\"new_approach\": <string or null>, \"stop\": <bool>}. Set stop only when no approach can work.";

pub fn stuck_prompt(goal: &str, commands: &[&str], log_tail: &str) -> String {
    let listed: Vec<String> = commands.iter().map(|c| format!("- {}", c)).collect();
    format!(
        "Goal: {}\n\nLast commands:\n{}\n\nRecent activity:\n{}",
        goal.trim(),
        listed.join("\n"),
        log_tail
    )
}

pub const VERIFICATION_SYSTEM_PROMPT: &str = "A coding agent says it is done but its checklist \
has open items. Decide whether the goal is nevertheless satisfied. Reply with a single JSON \
object: {\"complete\": <bool>, \"reason\": <string>}.";

pub fn verification_prompt(goal: &str, remaining: &[&TaskChecklistItem], response: &str) -> String {
    let listed: Vec<String> = remaining
        .iter()
        .map(|i| format!("- {}. {} ({:?})", i.id, i.description, i.status))
        .collect();
    format!(
        "Goal: {}\n\nOpen items:\n{}\n\nAgent's last message:\n{}",
        goal.trim(),
        listed.join("\n"),
        response.trim()
    )
}
