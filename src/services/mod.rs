//! Services
//!
//! The engine's moving parts. The orchestrator drives a run and receives
//! every other service as an injected collaborator; the session layers
//! conversation history, checkpoints and persistence on top of it.

pub mod approval;
pub mod checklist;
pub mod checkpoint;
pub mod context;
pub mod decision;
pub mod events;
pub mod file_lock;
pub mod orchestrator;
pub mod persistence;
pub mod profile;
pub mod session;
pub mod stuck;

pub use approval::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprove, ChannelApprovalGate,
    HunkDecision, RejectAll,
};
pub use checklist::ChecklistTracker;
pub use checkpoint::{CheckpointStore, RollbackReport};
pub use context::{ContextBudget, ContextCompactor, ContextWindowManager};
pub use decision::{Decision, DecisionClient};
pub use events::{EngineEvent, EventBus, ToolStatus};
pub use file_lock::{FileLockCoordinator, FileLockGuard};
pub use orchestrator::{CheckpointBinding, Orchestrator, PhaseMachine, RunHandle, RunOptions};
pub use persistence::{DebouncedPersister, JsonDirSessionStore, MemorySessionStore, SessionStore};
pub use profile::ProfileSelector;
pub use session::AgentSession;
pub use stuck::StuckDetector;
