//! Run State
//!
//! `RunHandle` is the caller's side of a run (cancel, inject feedback).
//! `RunState` is everything the orchestrator mutates while driving one run;
//! it lives on the run's task and is never shared.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use stepwise_llm::{Message, UsageStats};

use crate::models::phase::ExecutionPhase;
use crate::models::outcome::RunCaveat;
use crate::models::profile::Profile;
use crate::services::checkpoint::CheckpointStore;
use crate::services::checklist::ChecklistTracker;
use crate::services::context::ContextWindowManager;
use crate::services::events::{EngineEvent, EventBus};
use crate::services::profile::{ProfileSelector, ProfileSwitch};
use crate::services::stuck::StuckDetector;
use crate::utils::error::EngineResult;

use super::state_machine::PhaseMachine;

// ============================================================================
// RunHandle
// ============================================================================

/// Caller-side control of a run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    feedback: Arc<Mutex<VecDeque<String>>>,
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHandle {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            feedback: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue feedback for the next safe point. Returns false once cancelled.
    pub fn inject_feedback(&self, text: impl Into<String>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let text = text.into();
        if text.trim().is_empty() {
            return false;
        }
        self.feedback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(text);
        true
    }

    /// Take every queued message, oldest first.
    pub(crate) fn drain_feedback(&self) -> Vec<String> {
        self.feedback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }
}

// ============================================================================
// RunOptions
// ============================================================================

/// Checkpoint the run records file snapshots and commands into.
#[derive(Debug, Clone)]
pub struct CheckpointBinding {
    pub store: Arc<tokio::sync::Mutex<CheckpointStore>>,
    pub checkpoint_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Seeded into the context log before the first step.
    pub initial_context: Vec<String>,
    /// Earlier conversation turns sent ahead of the goal.
    pub history: Vec<Message>,
    pub checkpoint: Option<CheckpointBinding>,
    /// Profile carried over from a previous run (auto selection only).
    pub profile: Option<Profile>,
    pub handle: RunHandle,
}

impl RunOptions {
    pub fn with_handle(mut self, handle: RunHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn with_initial_context(mut self, entries: Vec<String>) -> Self {
        self.initial_context = entries;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_checkpoint(mut self, binding: CheckpointBinding) -> Self {
        self.checkpoint = Some(binding);
        self
    }
}

// ============================================================================
// RunState
// ============================================================================

pub(crate) struct RunState {
    pub run_id: String,
    pub goal: String,
    pub handle: RunHandle,
    pub events: EventBus,
    pub phases: PhaseMachine,
    pub checklist: ChecklistTracker,
    pub window: ContextWindowManager,
    pub stuck: StuckDetector,
    pub profile: ProfileSelector,
    pub checkpoint: Option<CheckpointBinding>,
    pub history: Vec<Message>,
    pub usage: UsageStats,
    pub iterations: u32,
    pub caveat: Option<RunCaveat>,
    pub response: Option<String>,
    pub goal_satisfied: bool,
}

impl RunState {
    pub fn cancel_token(&self) -> CancellationToken {
        self.handle.cancellation_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Validated transition, announced on the bus.
    pub async fn enter(&mut self, next: ExecutionPhase) -> EngineResult<()> {
        self.phases.transition(next.clone())?;
        self.announce(next).await;
        Ok(())
    }

    /// Unconditional transition, announced on the bus.
    pub async fn force(&mut self, next: ExecutionPhase) {
        self.phases.force(next.clone());
        self.announce(next).await;
    }

    async fn announce(&self, phase: ExecutionPhase) {
        self.events
            .emit(EngineEvent::PhaseChanged {
                run_id: self.run_id.clone(),
                phase,
            })
            .await;
    }

    pub fn executing(&self) -> ExecutionPhase {
        ExecutionPhase::Executing {
            step: self.iterations,
            estimated_total: self.checklist.len() as u32,
        }
    }

    pub async fn emit_checklist(&self) {
        self.events
            .emit(EngineEvent::ChecklistUpdated {
                run_id: self.run_id.clone(),
                items: self.checklist.items().to_vec(),
                progress_percent: self.checklist.progress_percent(),
            })
            .await;
    }

    pub async fn notice(&self, message: impl Into<String>) {
        self.events
            .emit(EngineEvent::Notice {
                run_id: self.run_id.clone(),
                message: message.into(),
            })
            .await;
    }

    /// Log and announce a profile switch.
    pub async fn record_switch(&mut self, switch: ProfileSwitch) {
        self.window.append(switch.audit_line());
        self.events
            .emit(EngineEvent::ProfileSwitched {
                run_id: self.run_id.clone(),
                from: switch.from,
                to: switch.to,
                reason: switch.reason,
            })
            .await;
    }

    /// Last `max_chars` characters of the rendered context log.
    pub fn log_tail(&self, max_chars: usize) -> String {
        let log = self.window.render();
        let count = log.chars().count();
        if count <= max_chars {
            return log;
        }
        log.chars().skip(count - max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_is_fifo_and_drained_once() {
        let handle = RunHandle::new();
        assert!(handle.inject_feedback("use port 8081"));
        assert!(handle.inject_feedback("skip the docs"));
        assert!(!handle.inject_feedback("   "));
        assert_eq!(handle.drain_feedback(), vec!["use port 8081", "skip the docs"]);
        assert!(handle.drain_feedback().is_empty());
    }

    #[test]
    fn test_cancel_is_shared_and_blocks_feedback() {
        let handle = RunHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        assert!(handle.cancellation_token().is_cancelled());
        assert!(!handle.inject_feedback("too late"));
        assert_eq!(handle.run_id(), clone.run_id());
    }
}
