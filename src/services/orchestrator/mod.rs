//! Orchestrator
//!
//! Runs a goal through the phase state machine and the step/tool loop,
//! wiring the checklist, context window, approval gate, file locks,
//! checkpoints and decision prompts together.

mod bookkeeping;
mod dispatch;
pub mod prompts;
mod run;
mod service;
pub mod state_machine;

pub use run::{CheckpointBinding, RunHandle, RunOptions};
pub use service::Orchestrator;
pub use state_machine::{is_legal, PhaseMachine};
