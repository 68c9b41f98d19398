//! Execution State Machine
//!
//! Tracks a run's phase and validates transitions against a fixed table.
//! By default an illegal transition is logged and forced through; with
//! `strict` it is rejected. Entering `Cancelled` from any non-terminal
//! phase is always legal.

use tracing::warn;

use crate::models::phase::{ExecutionPhase, PhaseKind};
use crate::utils::error::{EngineError, EngineResult};

/// Whether `from -> to` is in the transition table.
pub fn is_legal(from: PhaseKind, to: PhaseKind) -> bool {
    use PhaseKind::*;

    if to == Cancelled {
        return !from.is_terminal();
    }
    match from {
        Idle => to == Starting,
        Starting => matches!(to, Executing | Completed),
        Executing => matches!(
            to,
            Executing
                | Reflecting
                | Verifying
                | WaitingForApproval
                | WaitingForFileLock
                | Summarizing
                | Completed
        ),
        Reflecting => to == Executing,
        Verifying => matches!(to, Executing | Completed),
        WaitingForApproval | WaitingForFileLock | Summarizing => to == Executing,
        Completed | Cancelled => to == Starting,
    }
}

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: ExecutionPhase,
    history: Vec<ExecutionPhase>,
    strict: bool,
}

impl PhaseMachine {
    pub fn new(strict: bool) -> Self {
        Self {
            current: ExecutionPhase::Idle,
            history: vec![ExecutionPhase::Idle],
            strict,
        }
    }

    pub fn current(&self) -> &ExecutionPhase {
        &self.current
    }

    pub fn kind(&self) -> PhaseKind {
        self.current.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn history(&self) -> &[ExecutionPhase] {
        &self.history
    }

    pub fn transition(&mut self, next: ExecutionPhase) -> EngineResult<()> {
        let from = self.kind();
        let to = next.kind();
        if !is_legal(from, to) {
            if self.strict {
                return Err(EngineError::IllegalTransition { from, to });
            }
            warn!("[state] forcing illegal transition {} -> {}", from, to);
        }
        self.enter(next);
        Ok(())
    }

    /// Enter `next` regardless of mode. Used for terminal transitions.
    pub fn force(&mut self, next: ExecutionPhase) {
        let from = self.kind();
        let to = next.kind();
        if !is_legal(from, to) {
            warn!("[state] forcing illegal transition {} -> {}", from, to);
        }
        self.enter(next);
    }

    fn enter(&mut self, next: ExecutionPhase) {
        self.history.push(next.clone());
        self.current = next;
    }
}
