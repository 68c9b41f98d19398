//! Data Models
//!
//! Plain data shared across the engine's services.

pub mod checklist;
pub mod checkpoint;
pub mod outcome;
pub mod phase;
pub mod profile;
pub mod session;
pub mod settings;

pub use checklist::{TaskChecklistItem, TaskStatus};
pub use checkpoint::{Checkpoint, CheckpointSummary, FileSnapshot};
pub use outcome::{RunCaveat, RunOutcome};
pub use phase::{ExecutionPhase, PhaseKind};
pub use profile::{Confidence, Profile, ProfileSelection};
pub use session::{SessionSnapshot, SessionSummary};
pub use settings::{EngineConfig, EngineConfigBuilder};
