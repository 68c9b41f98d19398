//! Checkpoint Store
//!
//! In-memory checkpoints anchored to message indices. At most one
//! checkpoint is current (accepting records); creating a new one or
//! finishing a run seals it. Rollback restores every snapshot taken at or
//! after the target checkpoint and keeps going past individual failures.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use stepwise_tools::unified_diff;

use crate::models::checkpoint::{Checkpoint, CheckpointSummary, FileSnapshot};
use crate::utils::error::{EngineError, EngineResult};

const PREVIEW_CHARS: usize = 80;

/// Result of a rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Every snapshot was restored.
    pub success: bool,
    pub restored: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Message history should be truncated to this length.
    pub message_cutoff: usize,
    /// Commands that ran after the checkpoint and were not undone.
    pub unrevertable_commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointStore {
    checkpoints: Vec<Checkpoint>,
    current: Option<String>,
}

fn preview(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal the current checkpoint and open a new one.
    pub fn create_checkpoint(&mut self, anchor_index: usize, prompt: &str) -> String {
        self.seal_current();
        let id = Uuid::new_v4().to_string();
        self.checkpoints.push(Checkpoint {
            id: id.clone(),
            anchor_index,
            prompt_preview: preview(prompt),
            created_at: Utc::now(),
            snapshots: Vec::new(),
            shell_commands: Vec::new(),
            sealed: false,
            branched_from: None,
        });
        self.current = Some(id.clone());
        debug!("[checkpoint] opened {} at message {}", id, anchor_index);
        id
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Stop accepting records on the current checkpoint.
    pub fn seal_current(&mut self) {
        if let Some(id) = self.current.take() {
            if let Some(cp) = self.checkpoints.iter_mut().find(|c| c.id == id) {
                cp.sealed = true;
            }
        }
    }

    fn open_mut(&mut self, checkpoint_id: &str) -> EngineResult<&mut Checkpoint> {
        let cp = self
            .checkpoints
            .iter_mut()
            .find(|c| c.id == checkpoint_id)
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {}", checkpoint_id)))?;
        if cp.sealed {
            return Err(EngineError::validation(format!(
                "checkpoint {} is sealed",
                checkpoint_id
            )));
        }
        Ok(cp)
    }

    /// Record a file's pre-change content. The first record per path wins.
    ///
    /// `content_before == None` means the file did not exist. Returns whether
    /// a new snapshot was stored.
    pub fn record_file_change(
        &mut self,
        checkpoint_id: &str,
        path: &Path,
        content_before: Option<String>,
    ) -> EngineResult<bool> {
        let cp = self.open_mut(checkpoint_id)?;
        if cp.snapshot_for(path).is_some() {
            return Ok(false);
        }
        cp.snapshots.push(FileSnapshot {
            path: path.to_path_buf(),
            was_created: content_before.is_none(),
            content_before: content_before.unwrap_or_default(),
        });
        Ok(true)
    }

    pub fn record_shell_command(&mut self, checkpoint_id: &str, command: &str) -> EngineResult<()> {
        let cp = self.open_mut(checkpoint_id)?;
        cp.shell_commands.push(command.to_string());
        Ok(())
    }

    pub fn get(&self, checkpoint_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == checkpoint_id)
    }

    pub fn list(&self) -> Vec<CheckpointSummary> {
        self.checkpoints.iter().map(CheckpointSummary::from).collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    fn position(&self, checkpoint_id: &str) -> EngineResult<usize> {
        self.checkpoints
            .iter()
            .position(|c| c.id == checkpoint_id)
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {}", checkpoint_id)))
    }

    /// Restore files to their state at `checkpoint_id`.
    ///
    /// Later checkpoints are undone newest first so the target's snapshots
    /// land last. Every snapshot is attempted even after a failure. The
    /// target and everything after it are discarded; the caller truncates
    /// message history to `message_cutoff`.
    pub async fn rollback(
        &mut self,
        checkpoint_id: &str,
        remove_anchor_message: bool,
    ) -> EngineResult<RollbackReport> {
        let pos = self.position(checkpoint_id)?;
        let anchor_index = self.checkpoints[pos].anchor_index;

        let mut restored = Vec::new();
        let mut failed = Vec::new();
        let mut unrevertable = Vec::new();

        for cp in self.checkpoints[pos..].iter().rev() {
            for snapshot in &cp.snapshots {
                match restore_snapshot(snapshot).await {
                    Ok(()) => restored.push(snapshot.path.clone()),
                    Err(e) => {
                        warn!(
                            "[checkpoint] failed to restore {}: {}",
                            snapshot.path.display(),
                            e
                        );
                        failed.push((snapshot.path.clone(), e.to_string()));
                    }
                }
            }
        }
        for cp in &self.checkpoints[pos..] {
            unrevertable.extend(cp.shell_commands.iter().cloned());
        }

        self.checkpoints.truncate(pos);
        self.current = None;
        restored.sort();
        restored.dedup();

        Ok(RollbackReport {
            success: failed.is_empty(),
            restored,
            failed,
            message_cutoff: if remove_anchor_message {
                anchor_index
            } else {
                anchor_index + 1
            },
            unrevertable_commands: unrevertable,
        })
    }

    /// Open a new checkpoint that forks from `checkpoint_id` without touching files.
    pub fn branch(&mut self, checkpoint_id: &str, new_prompt: &str) -> EngineResult<String> {
        let anchor_index = self
            .get(checkpoint_id)
            .map(|c| c.anchor_index)
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {}", checkpoint_id)))?;
        let id = self.create_checkpoint(anchor_index, new_prompt);
        if let Some(cp) = self.checkpoints.last_mut() {
            cp.branched_from = Some(checkpoint_id.to_string());
        }
        Ok(id)
    }

    /// Unified diffs from each snapshot to the file's current content.
    pub async fn diff(&self, checkpoint_id: &str) -> EngineResult<Vec<(PathBuf, String)>> {
        let cp = self
            .get(checkpoint_id)
            .ok_or_else(|| EngineError::not_found(format!("checkpoint {}", checkpoint_id)))?;
        let mut diffs = Vec::with_capacity(cp.snapshots.len());
        for snapshot in &cp.snapshots {
            let current = match tokio::fs::read_to_string(&snapshot.path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            };
            let label = snapshot.path.to_string_lossy();
            diffs.push((
                snapshot.path.clone(),
                unified_diff(&label, &snapshot.content_before, &current),
            ));
        }
        Ok(diffs)
    }
}

async fn restore_snapshot(snapshot: &FileSnapshot) -> std::io::Result<()> {
    if snapshot.was_created {
        match tokio::fs::remove_file(&snapshot.path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    } else {
        if let Some(parent) = snapshot.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&snapshot.path, &snapshot.content_before).await
    }
}
