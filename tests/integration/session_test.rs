//! Session Integration Tests
//!
//! Checkpoint rollback through real file writes, and session snapshots
//! surviving a restart through the JSON directory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use stepwise::llm::mock::ScriptedProvider;
use stepwise::services::persistence::{DebouncedPersister, JsonDirSessionStore, SessionStore};
use stepwise::tools::impls::{DeleteFileTool, WriteFileTool};
use stepwise::tools::Tool;
use stepwise::{AgentSession, EventBus, Orchestrator, RunHandle};

use crate::support::{call, orchestrator, quiet_config};

fn file_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(WriteFileTool), Arc::new(DeleteFileTool)]
}

fn build(dir: &TempDir, provider: ScriptedProvider) -> Arc<Orchestrator> {
    Arc::new(
        orchestrator(quiet_config(), Arc::new(provider), file_tools(), dir.path())
            .with_session_id("integration-session"),
    )
}

#[tokio::test]
async fn test_write_modify_rollback_restores_original() {
    let dir = TempDir::new().unwrap();
    let readme = dir.path().join("README.md");
    let notes = dir.path().join("docs/notes.md");
    let obsolete = dir.path().join("OBSOLETE");
    std::fs::write(&readme, "# Project\n").unwrap();
    std::fs::write(&obsolete, "remove me\n").unwrap();

    let provider = ScriptedProvider::new("gpt-4o")
        .then_tools(vec![
            call("c1", "write_file", json!({"path": "README.md", "content": "# Project\n\nUsage\n"})),
            call("c2", "write_file", json!({"path": "docs/notes.md", "content": "draft\n"})),
        ])
        .then_text("Documented usage.")
        .then_tools(vec![
            call("c3", "write_file", json!({"path": "README.md", "content": "# Renamed\n"})),
            call("c4", "delete_file", json!({"path": "OBSOLETE"})),
        ])
        .then_text("Renamed and cleaned up.");
    let mut session = AgentSession::new(build(&dir, provider));

    session
        .send_user_message("document usage", RunHandle::new(), EventBus::disconnected())
        .await
        .unwrap();
    session
        .send_user_message("rename and clean up", RunHandle::new(), EventBus::disconnected())
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&readme).unwrap(), "# Renamed\n");
    assert!(notes.exists());
    assert!(!obsolete.exists());
    assert_eq!(session.messages().len(), 4);

    let checkpoints = session.checkpoints().await;
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].files_changed, 2);

    // Keep the anchoring user message.
    let report = session.rollback(&checkpoints[0].id, false).await.unwrap();

    assert!(report.success, "failed: {:?}", report.failed);
    assert_eq!(std::fs::read_to_string(&readme).unwrap(), "# Project\n");
    assert!(!notes.exists());
    assert_eq!(std::fs::read_to_string(&obsolete).unwrap(), "remove me\n");
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].plain_text(), "document usage");
}

#[tokio::test]
async fn test_rollback_of_later_checkpoint_keeps_earlier_work() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("version.txt");
    let provider = ScriptedProvider::new("gpt-4o")
        .then_tools(vec![call("c1", "write_file", json!({"path": "version.txt", "content": "1\n"}))])
        .then_text("v1")
        .then_tools(vec![call("c2", "write_file", json!({"path": "version.txt", "content": "2\n"}))])
        .then_text("v2");
    let mut session = AgentSession::new(build(&dir, provider));

    session
        .send_user_message("write v1", RunHandle::new(), EventBus::disconnected())
        .await
        .unwrap();
    session
        .send_user_message("write v2", RunHandle::new(), EventBus::disconnected())
        .await
        .unwrap();

    let second = session.checkpoints().await[1].id.clone();
    let diffs = session.diff(&second).await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].1.contains("-1"));
    assert!(diffs[0].1.contains("+2"));

    session.rollback(&second, true).await.unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "1\n");
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.checkpoints().await.len(), 1);
}

#[tokio::test]
async fn test_session_survives_restart_through_json_store() {
    let dir = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(JsonDirSessionStore::new(state.path()));

    let provider = ScriptedProvider::new("gpt-4o")
        .then_tools(vec![call("c1", "write_file", json!({"path": "a.txt", "content": "new\n"}))])
        .then_text("Wrote a.txt.");
    let orch = build(&dir, provider);
    let mut session = AgentSession::new(orch.clone()).with_persister(DebouncedPersister::new(
        store.clone(),
        Duration::from_millis(10),
    ));
    session
        .send_user_message("create a.txt", RunHandle::new(), EventBus::disconnected())
        .await
        .unwrap();
    session.flush().await.unwrap();
    drop(session);

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].session_id, "integration-session");
    assert_eq!(listed[0].message_count, 2);

    let snapshot = store.load("integration-session").await.unwrap().unwrap();
    let mut restored = AgentSession::restore(orch, snapshot);
    assert_eq!(restored.messages().len(), 2);

    // Checkpoints restored from disk still roll back.
    let first = restored.checkpoints().await[0].id.clone();
    let report = restored.rollback(&first, true).await.unwrap();
    assert!(report.success);
    assert!(!dir.path().join("a.txt").exists());
    assert!(restored.messages().is_empty());
}
