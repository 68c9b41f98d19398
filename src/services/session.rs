//! Agent Session
//!
//! A conversation of runs. The session owns the message history, the
//! checkpoint store shared with each run, the profile carried between runs
//! and an optional persistence handle. Every user message opens a
//! checkpoint anchored at that message's index.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use stepwise_llm::Message;

use crate::models::checkpoint::CheckpointSummary;
use crate::models::outcome::RunOutcome;
use crate::models::profile::Profile;
use crate::models::session::SessionSnapshot;
use crate::services::checkpoint::{CheckpointStore, RollbackReport};
use crate::services::events::EventBus;
use crate::services::orchestrator::{CheckpointBinding, Orchestrator, RunHandle, RunOptions};
use crate::services::persistence::DebouncedPersister;
use crate::utils::error::{EngineError, EngineResult};

pub struct AgentSession {
    session_id: String,
    orchestrator: Arc<Orchestrator>,
    messages: Vec<Message>,
    checkpoints: Arc<Mutex<CheckpointStore>>,
    profile: Option<Profile>,
    persister: Option<DebouncedPersister>,
}

impl AgentSession {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            session_id: orchestrator.session_id().to_string(),
            orchestrator,
            messages: Vec::new(),
            checkpoints: Arc::new(Mutex::new(CheckpointStore::new())),
            profile: None,
            persister: None,
        }
    }

    /// Rebuild a session from a stored snapshot.
    pub fn restore(orchestrator: Arc<Orchestrator>, snapshot: SessionSnapshot) -> Self {
        if snapshot.config != *orchestrator.config() {
            warn!(
                "[session] restoring {} with a config that differs from the saved one",
                snapshot.session_id
            );
        }
        Self {
            session_id: snapshot.session_id,
            orchestrator,
            messages: snapshot.messages,
            checkpoints: Arc::new(Mutex::new(snapshot.checkpoints)),
            profile: snapshot.profile,
            persister: None,
        }
    }

    pub fn with_persister(mut self, persister: DebouncedPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn profile(&self) -> Option<Profile> {
        self.profile
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run `text` as a new goal with the conversation so far as history.
    pub async fn send_user_message(
        &mut self,
        text: &str,
        handle: RunHandle,
        events: EventBus,
    ) -> EngineResult<RunOutcome> {
        if text.trim().is_empty() {
            return Err(EngineError::validation("message is empty"));
        }
        let checkpoint_id = self
            .checkpoints
            .lock()
            .await
            .create_checkpoint(self.messages.len(), text);
        Ok(self.run_from(text, checkpoint_id, handle, events).await)
    }

    /// Undo file changes back to `checkpoint_id` and truncate history.
    ///
    /// Partial failures are reported, not raised; history is truncated
    /// either way.
    pub async fn rollback(
        &mut self,
        checkpoint_id: &str,
        remove_anchor_message: bool,
    ) -> EngineResult<RollbackReport> {
        let report = self
            .checkpoints
            .lock()
            .await
            .rollback(checkpoint_id, remove_anchor_message)
            .await?;
        self.messages
            .truncate(report.message_cutoff.min(self.messages.len()));
        if !report.success {
            warn!(
                "[session] rollback to {} left {} file(s) unrestored",
                checkpoint_id,
                report.failed.len()
            );
        }
        info!(
            "[session] rolled back to {} ({} restored, {} messages kept)",
            checkpoint_id,
            report.restored.len(),
            self.messages.len()
        );
        self.schedule_save().await;
        Ok(report)
    }

    /// Resend a corrected prompt from `checkpoint_id`'s anchor.
    ///
    /// Files are left untouched; only the conversation forks.
    pub async fn branch(
        &mut self,
        checkpoint_id: &str,
        new_prompt: &str,
        handle: RunHandle,
        events: EventBus,
    ) -> EngineResult<RunOutcome> {
        if new_prompt.trim().is_empty() {
            return Err(EngineError::validation("message is empty"));
        }
        let (branch_id, anchor_index) = {
            let mut store = self.checkpoints.lock().await;
            let anchor_index = store
                .get(checkpoint_id)
                .map(|c| c.anchor_index)
                .ok_or_else(|| EngineError::not_found(format!("checkpoint {}", checkpoint_id)))?;
            (store.branch(checkpoint_id, new_prompt)?, anchor_index)
        };
        self.messages.truncate(anchor_index.min(self.messages.len()));
        Ok(self.run_from(new_prompt, branch_id, handle, events).await)
    }

    pub async fn checkpoints(&self) -> Vec<CheckpointSummary> {
        self.checkpoints.lock().await.list()
    }

    pub async fn diff(&self, checkpoint_id: &str) -> EngineResult<Vec<(PathBuf, String)>> {
        self.checkpoints.lock().await.diff(checkpoint_id).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            checkpoints: self.checkpoints.lock().await.clone(),
            config: self.orchestrator.config().clone(),
            profile: self.profile,
            saved_at: Utc::now(),
        }
    }

    /// Write the session synchronously. No-op without a persister.
    pub async fn flush(&self) -> EngineResult<()> {
        match &self.persister {
            Some(persister) => persister.flush_now(self.snapshot().await).await,
            None => Ok(()),
        }
    }

    async fn run_from(
        &mut self,
        text: &str,
        checkpoint_id: String,
        handle: RunHandle,
        events: EventBus,
    ) -> RunOutcome {
        let mut options = RunOptions::default()
            .with_handle(handle)
            .with_history(self.messages.clone())
            .with_checkpoint(CheckpointBinding {
                store: self.checkpoints.clone(),
                checkpoint_id,
            });
        options.profile = self.profile;

        let outcome = self.orchestrator.run(text, options, events).await;

        self.messages.push(Message::user(text));
        match (&outcome.response, &outcome.error) {
            (Some(response), _) => self.messages.push(Message::assistant(response.clone())),
            (None, Some(error)) => self
                .messages
                .push(Message::assistant(format!("Error: {}", error))),
            (None, None) => {}
        }
        self.profile = Some(outcome.profile);
        self.schedule_save().await;
        outcome
    }

    async fn schedule_save(&self) {
        if let Some(persister) = &self.persister {
            persister.schedule(self.snapshot().await);
        }
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("session_id", &self.session_id)
            .field("messages", &self.messages.len())
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}
