//! Profile Selector
//!
//! Maps the task at hand to a behavioral profile through a one-shot
//! classification prompt. Low-confidence or unparseable answers are
//! ignored; a switch only happens under `ProfileSelection::Auto`.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::profile::{Confidence, Profile, ProfileSelection};
use crate::services::decision::DecisionClient;
use crate::utils::error::EngineResult;

const CONTEXT_CHARS: usize = 1_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAnalysis {
    pub profile: Profile,
    pub reason: String,
    pub confidence: Confidence,
}

/// A switch that actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSwitch {
    pub from: Profile,
    pub to: Profile,
    pub reason: String,
}

impl ProfileSwitch {
    /// Line appended to the context log.
    pub fn audit_line(&self) -> String {
        format!(
            "[profile] switched {} -> {}: {}",
            self.from, self.to, self.reason
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProfileSelector {
    selection: ProfileSelection,
    active: Profile,
}

fn classification_system_prompt() -> String {
    let ids: Vec<&str> = Profile::ALL.iter().map(|p| p.id()).collect();
    format!(
        "You choose the working profile for a coding agent. Profiles: {}. \
Reply with a single JSON object: {{\"profile\": <id>, \"reason\": <short reason>, \
\"confidence\": \"low\" | \"medium\" | \"high\"}}.",
        ids.join(", ")
    )
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

impl ProfileSelector {
    pub fn new(selection: ProfileSelection) -> Self {
        Self {
            selection,
            active: selection.initial_profile(),
        }
    }

    pub fn selection(&self) -> ProfileSelection {
        self.selection
    }

    pub fn active(&self) -> Profile {
        self.active
    }

    /// Change the user's selection. A fixed selection takes effect immediately.
    pub fn set_selection(&mut self, selection: ProfileSelection) {
        self.selection = selection;
        if let ProfileSelection::Fixed(p) = selection {
            self.active = p;
        }
    }

    /// Classify `task`. Returns `None` for low confidence or no usable answer.
    pub async fn analyze(
        &self,
        decisions: &DecisionClient,
        task: &str,
        next_tasks: &[String],
        recent_context: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<ProfileAnalysis>> {
        let mut user = format!("Current task: {}\n", task.trim());
        if !next_tasks.is_empty() {
            user.push_str("Upcoming tasks:\n");
            for t in next_tasks {
                user.push_str(&format!("- {}\n", t));
            }
        }
        let context = tail_chars(recent_context.trim(), CONTEXT_CHARS);
        if !context.is_empty() {
            user.push_str(&format!("Recent activity:\n{}\n", context));
        }
        user.push_str(&format!("Active profile: {}", self.active));

        let decision = decisions
            .ask(&classification_system_prompt(), &user, cancel)
            .await?;

        let Some(profile) = decision.str("profile").and_then(Profile::from_id) else {
            debug!("[profile] no usable profile in reply");
            return Ok(None);
        };
        let confidence = decision
            .str("confidence")
            .and_then(Confidence::parse)
            .unwrap_or(Confidence::Low);
        if confidence == Confidence::Low {
            debug!("[profile] ignoring low-confidence suggestion {}", profile);
            return Ok(None);
        }
        Ok(Some(ProfileAnalysis {
            profile,
            reason: decision.str("reason").unwrap_or("no reason given").to_string(),
            confidence,
        }))
    }

    /// Retarget the active profile when auto-selecting and it differs.
    pub fn switch_if_needed(&mut self, profile: Profile, reason: &str) -> Option<ProfileSwitch> {
        if !self.selection.is_auto() || profile == self.active {
            return None;
        }
        let switch = ProfileSwitch {
            from: self.active,
            to: profile,
            reason: reason.to_string(),
        };
        info!("[profile] {} -> {} ({})", switch.from, switch.to, reason);
        self.active = profile;
        Some(switch)
    }
}
