//! Stepwise
//!
//! An agent orchestration engine: drives an LLM through a phase state
//! machine and a step/tool loop while tracking a task checklist, keeping
//! the context window within budget, gating file mutations behind approval
//! and per-path locks, and checkpointing file state for rollback.
//!
//! The LLM client and tool contracts live in `stepwise-llm` and
//! `stepwise-tools`; both are re-exported here.

pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use stepwise_llm as llm;
pub use stepwise_tools as tools;

pub use models::{
    EngineConfig, EngineConfigBuilder, ExecutionPhase, PhaseKind, Profile, ProfileSelection,
    RunCaveat, RunOutcome, TaskChecklistItem, TaskStatus,
};
pub use services::{
    AgentSession, ApprovalDecision, ApprovalGate, EngineEvent, EventBus, FileLockCoordinator,
    Orchestrator, RunHandle, RunOptions,
};
pub use utils::error::{EngineError, EngineResult};
