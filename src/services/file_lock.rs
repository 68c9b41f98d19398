//! File Lock Coordinator
//!
//! The only resource shared between concurrent runs. Writers are
//! serialized per path: a run that finds a path held by another run parks
//! until the holder releases it or its own cancellation fires. A run may
//! re-acquire a path it already holds.
//!
//! Guards release on drop; `release_all` drops everything a run holds
//! regardless of outstanding guards and is called on every terminal
//! transition.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use stepwise_core::{CoreError, CoreResult};

#[derive(Debug)]
struct Holder {
    run_id: String,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct FileLockCoordinator {
    locks: Mutex<HashMap<PathBuf, Holder>>,
    released: Notify,
}

/// Lexically normalize a path (drop `.`, resolve `..`) so aliases share a lock.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl FileLockCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the lock if it is free or already held by `run_id`.
    pub fn try_acquire(self: &Arc<Self>, path: &Path, run_id: &str) -> Option<FileLockGuard> {
        let key = normalize_path(path);
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        match locks.get_mut(&key) {
            Some(holder) if holder.run_id == run_id => holder.depth += 1,
            Some(_) => return None,
            None => {
                locks.insert(
                    key.clone(),
                    Holder {
                        run_id: run_id.to_string(),
                        depth: 1,
                    },
                );
            }
        }
        Some(FileLockGuard {
            coordinator: Arc::clone(self),
            path: key,
            run_id: run_id.to_string(),
        })
    }

    /// Wait for the lock, giving up when `cancel` fires.
    pub async fn acquire(
        self: &Arc<Self>,
        path: &Path,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<FileLockGuard> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.try_acquire(path, run_id) {
                return Ok(guard);
            }
            debug!("[file_lock] {} waiting for {}", run_id, path.display());

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    return Err(CoreError::cancelled(format!(
                        "waiting for lock on {}",
                        path.display()
                    )));
                }
            }
        }
    }

    /// Run currently holding `path`, if any.
    pub fn holder(&self, path: &Path) -> Option<String> {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.get(&normalize_path(path)).map(|h| h.run_id.clone())
    }

    /// Paths held by `run_id`, sorted.
    pub fn held_by(&self, run_id: &str) -> Vec<PathBuf> {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let mut paths: Vec<PathBuf> = locks
            .iter()
            .filter(|(_, h)| h.run_id == run_id)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Release every lock held by `run_id`. Returns how many paths were freed.
    pub fn release_all(&self, run_id: &str) -> usize {
        let freed = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            let before = locks.len();
            locks.retain(|_, h| h.run_id != run_id);
            before - locks.len()
        };
        if freed > 0 {
            debug!("[file_lock] released {} lock(s) held by {}", freed, run_id);
            self.released.notify_waiters();
        }
        freed
    }

    fn release_one(&self, path: &Path, run_id: &str) {
        let freed = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            match locks.get_mut(path) {
                Some(holder) if holder.run_id == run_id => {
                    holder.depth = holder.depth.saturating_sub(1);
                    if holder.depth == 0 {
                        locks.remove(path);
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        if freed {
            self.released.notify_waiters();
        }
    }
}

/// Held lock on one path; releases on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    coordinator: Arc<FileLockCoordinator>,
    path: PathBuf,
    run_id: String,
}

impl FileLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.coordinator.release_one(&self.path, &self.run_id);
    }
}
