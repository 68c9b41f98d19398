//! Session Models
//!
//! The persisted shape of an agent session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stepwise_llm::Message;

use crate::models::profile::Profile;
use crate::models::settings::EngineConfig;
use crate::services::checkpoint::CheckpointStore;

/// Everything needed to restore a session after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub checkpoints: CheckpointStore,
    #[serde(default)]
    pub config: EngineConfig,
    /// Profile carried into the next run.
    #[serde(default)]
    pub profile: Option<Profile>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(session_id: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            checkpoints: CheckpointStore::default(),
            config,
            profile: None,
            saved_at: Utc::now(),
        }
    }
}

/// Listing entry for stored sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub saved_at: DateTime<Utc>,
}

impl From<&SessionSnapshot> for SessionSummary {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id.clone(),
            message_count: snapshot.messages.len(),
            saved_at: snapshot.saved_at,
        }
    }
}
