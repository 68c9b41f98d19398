//! Session Persistence
//!
//! `SessionStore` is the opaque save/load surface for session snapshots.
//! `DebouncedPersister` sits in front of a store: `schedule()` coalesces
//! bursts of writes into one save at most `delay` after the first pending
//! schedule, and `flush_now()` writes synchronously for shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::session::{SessionSnapshot, SessionSummary};
use crate::utils::error::{EngineError, EngineResult};

/// Default delay between the first pending schedule and its save.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, snapshot: &SessionSnapshot) -> EngineResult<()>;

    async fn load(&self, session_id: &str) -> EngineResult<Option<SessionSnapshot>>;

    /// Returns whether a session was removed.
    async fn delete(&self, session_id: &str) -> EngineResult<bool>;

    /// Stored sessions, most recently saved first.
    async fn list(&self) -> EngineResult<Vec<SessionSummary>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> EngineResult<()> {
        self.sessions
            .write()
            .await
            .insert(snapshot.session_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> EngineResult<Option<SessionSnapshot>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> EngineResult<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> EngineResult<Vec<SessionSummary>> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(SessionSummary::from)
            .collect();
        out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(out)
    }
}

// ============================================================================
// JSON directory store
// ============================================================================

/// One pretty-printed `<session_id>.json` file per session.
#[derive(Debug, Clone)]
pub struct JsonDirSessionStore {
    root: PathBuf,
}

impl JsonDirSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session_id: &str) -> EngineResult<PathBuf> {
        let invalid = session_id.is_empty()
            || session_id == "."
            || session_id == ".."
            || session_id.contains(['/', '\\'])
            || session_id.chars().any(char::is_control);
        if invalid {
            return Err(EngineError::validation(format!(
                "invalid session id: {:?}",
                session_id
            )));
        }
        Ok(self.root.join(format!("{}.json", session_id)))
    }
}

#[async_trait]
impl SessionStore for JsonDirSessionStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> EngineResult<()> {
        let path = self.path_for(&snapshot.session_id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let body = serde_json::to_string_pretty(snapshot)?;
        // Write then rename; readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("[persistence] saved session {}", snapshot.session_id);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> EngineResult<Option<SessionSnapshot>> {
        let path = self.path_for(session_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, session_id: &str) -> EngineResult<bool> {
        let path = self.path_for(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> EngineResult<Vec<SessionSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let body = match tokio::fs::read_to_string(&path).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("[persistence] skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                match serde_json::from_str::<SessionSnapshot>(&body) {
                    Ok(snapshot) => out.push(SessionSummary::from(&snapshot)),
                    Err(e) => warn!("[persistence] skipping {}: {}", path.display(), e),
                }
            }
        }
        out.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(out)
    }
}

// ============================================================================
// Debounced writer
// ============================================================================

enum PersistCommand {
    Schedule(Box<SessionSnapshot>),
    Flush(Box<SessionSnapshot>, oneshot::Sender<EngineResult<()>>),
}

/// Coalesces snapshot writes on a background task.
///
/// Must be created inside a tokio runtime. The task exits once every
/// clone of the persister is dropped, writing any pending snapshot first.
#[derive(Clone)]
pub struct DebouncedPersister {
    tx: mpsc::Sender<PersistCommand>,
    store: Arc<dyn SessionStore>,
}

impl DebouncedPersister {
    pub fn new(store: Arc<dyn SessionStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(persist_loop(store.clone(), rx, delay));
        Self { tx, store }
    }

    pub fn with_default_delay(store: Arc<dyn SessionStore>) -> Self {
        Self::new(store, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Queue a save. Later snapshots replace earlier ones still waiting.
    pub fn schedule(&self, snapshot: SessionSnapshot) {
        if let Err(e) = self.tx.try_send(PersistCommand::Schedule(Box::new(snapshot))) {
            debug!("[persistence] schedule dropped: {}", e);
        }
    }

    /// Write `snapshot` now, discarding any pending scheduled save.
    pub async fn flush_now(&self, snapshot: SessionSnapshot) -> EngineResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .tx
            .send(PersistCommand::Flush(Box::new(snapshot.clone()), done_tx))
            .await
            .is_err()
        {
            // Writer task is gone; save directly.
            return self.store.save(&snapshot).await;
        }
        done_rx
            .await
            .map_err(|_| EngineError::internal("persistence task dropped the flush"))?
    }
}

impl std::fmt::Debug for DebouncedPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedPersister").finish_non_exhaustive()
    }
}

async fn persist_loop(
    store: Arc<dyn SessionStore>,
    mut rx: mpsc::Receiver<PersistCommand>,
    delay: Duration,
) {
    let mut pending: Option<Box<SessionSnapshot>> = None;
    // Set by the first schedule after a write; later schedules never push it back.
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => match tokio::time::timeout_at(at, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    deadline = None;
                    if let Some(snapshot) = pending.take() {
                        write_logged(store.as_ref(), &snapshot).await;
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(PersistCommand::Schedule(snapshot)) => {
                pending = Some(snapshot);
                deadline.get_or_insert_with(|| Instant::now() + delay);
            }
            Some(PersistCommand::Flush(snapshot, done)) => {
                pending = None;
                deadline = None;
                let _ = done.send(store.save(&snapshot).await);
            }
            None => {
                if let Some(snapshot) = pending.take() {
                    write_logged(store.as_ref(), &snapshot).await;
                }
                break;
            }
        }
    }
}

async fn write_logged(store: &dyn SessionStore, snapshot: &SessionSnapshot) {
    if let Err(e) = store.save(snapshot).await {
        warn!(
            "[persistence] failed to save session {}: {}",
            snapshot.session_id, e
        );
    }
}
