//! Run Outcome

use serde::{Deserialize, Serialize};
use stepwise_llm::UsageStats;

use crate::models::checklist::TaskChecklistItem;
use crate::models::phase::PhaseKind;
use crate::models::profile::Profile;

/// Why a completed run stopped short of a clean finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCaveat {
    /// `max_iterations` steps were used up
    IterationLimit,
    /// A single step exhausted `max_tool_loops` LLM rounds
    ToolLoopLimit,
    /// Stuck detection recommended stopping
    Stuck,
    /// Verification was overridden with work still open
    VerificationOverride,
}

/// Final report of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// `Completed` or `Cancelled`
    pub phase: PhaseKind,
    /// Last assistant text, or a synthesized message when a limit was hit
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<RunCaveat>,
    /// Provider error that ended the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub iterations: u32,
    pub usage: UsageStats,
    /// Verification accepted the result (every item terminal or an override)
    pub goal_satisfied: bool,
    pub checklist: Vec<TaskChecklistItem>,
    /// Profile active when the run ended
    pub profile: Profile,
    pub summarizations: u32,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.phase == PhaseKind::Cancelled
    }

    /// Completed with no error and no caveat.
    pub fn is_clean(&self) -> bool {
        self.phase == PhaseKind::Completed && self.error.is_none() && self.caveat.is_none()
    }
}
