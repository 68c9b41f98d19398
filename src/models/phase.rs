//! Execution Phases
//!
//! The run's tagged state. Legal transitions live in
//! `services::orchestrator::state_machine`.

use serde::{Deserialize, Serialize};

/// Current phase of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ExecutionPhase {
    Idle,
    Starting,
    /// `estimated_total` is the checklist size, 0 when unknown.
    Executing { step: u32, estimated_total: u32 },
    Reflecting,
    Verifying,
    WaitingForApproval,
    WaitingForFileLock { path: String },
    Summarizing,
    Completed,
    Cancelled,
}

/// Payload-free discriminant of [`ExecutionPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Starting,
    Executing,
    Reflecting,
    Verifying,
    WaitingForApproval,
    WaitingForFileLock,
    Summarizing,
    Completed,
    Cancelled,
}

impl ExecutionPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            ExecutionPhase::Idle => PhaseKind::Idle,
            ExecutionPhase::Starting => PhaseKind::Starting,
            ExecutionPhase::Executing { .. } => PhaseKind::Executing,
            ExecutionPhase::Reflecting => PhaseKind::Reflecting,
            ExecutionPhase::Verifying => PhaseKind::Verifying,
            ExecutionPhase::WaitingForApproval => PhaseKind::WaitingForApproval,
            ExecutionPhase::WaitingForFileLock { .. } => PhaseKind::WaitingForFileLock,
            ExecutionPhase::Summarizing => PhaseKind::Summarizing,
            ExecutionPhase::Completed => PhaseKind::Completed,
            ExecutionPhase::Cancelled => PhaseKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

impl PhaseKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseKind::Completed | PhaseKind::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Idle => "idle",
            PhaseKind::Starting => "starting",
            PhaseKind::Executing => "executing",
            PhaseKind::Reflecting => "reflecting",
            PhaseKind::Verifying => "verifying",
            PhaseKind::WaitingForApproval => "waiting_for_approval",
            PhaseKind::WaitingForFileLock => "waiting_for_file_lock",
            PhaseKind::Summarizing => "summarizing",
            PhaseKind::Completed => "completed",
            PhaseKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPhase::Executing {
                step,
                estimated_total,
            } if *estimated_total > 0 => write!(f, "executing({}/{})", step, estimated_total),
            ExecutionPhase::Executing { step, .. } => write!(f, "executing({})", step),
            ExecutionPhase::WaitingForFileLock { path } => {
                write!(f, "waiting_for_file_lock({})", path)
            }
            other => f.write_str(other.kind().as_str()),
        }
    }
}
