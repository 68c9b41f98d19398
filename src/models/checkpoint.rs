//! Checkpoint Models
//!
//! A checkpoint anchors file state to a user message. Snapshots hold the
//! content a file had before the first change made after the checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pre-change state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: PathBuf,
    /// Content before the first change; empty when `was_created`.
    pub content_before: String,
    /// The file did not exist before; rollback deletes it.
    pub was_created: bool,
}

/// A rollback point anchored to a message index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub anchor_index: usize,
    pub prompt_preview: String,
    pub created_at: DateTime<Utc>,
    pub snapshots: Vec<FileSnapshot>,
    /// Commands run since the checkpoint; these cannot be undone.
    pub shell_commands: Vec<String>,
    /// Sealed checkpoints accept no further records.
    pub sealed: bool,
    /// Checkpoint this one was branched from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branched_from: Option<String>,
}

impl Checkpoint {
    pub fn snapshot_for(&self, path: &std::path::Path) -> Option<&FileSnapshot> {
        self.snapshots.iter().find(|s| s.path == path)
    }
}

/// Listing entry for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub anchor_index: usize,
    pub prompt_preview: String,
    pub created_at: DateTime<Utc>,
    pub files_changed: usize,
    pub commands_run: usize,
    pub sealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branched_from: Option<String>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id.clone(),
            anchor_index: cp.anchor_index,
            prompt_preview: cp.prompt_preview.clone(),
            created_at: cp.created_at,
            files_changed: cp.snapshots.len(),
            commands_run: cp.shell_commands.len(),
            sealed: cp.sealed,
            branched_from: cp.branched_from.clone(),
        }
    }
}
