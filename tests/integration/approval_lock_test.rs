//! Approval and File Lock Integration Tests
//!
//! File mutations routed through `ChannelApprovalGate` with a real
//! `write_file` tool in a temp directory, plus lock release on cancel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

use stepwise::llm::mock::ScriptedProvider;
use stepwise::llm::ParameterSchema;
use stepwise::models::ExecutionPhase;
use stepwise::services::approval::{ApprovalRequest, ChannelApprovalGate, HunkDecision};
use stepwise::services::events::ToolStatus;
use stepwise::tools::impls::WriteFileTool;
use stepwise::tools::{FileOperation, FunctionTool, Tool, ToolCapability, ToolResult};
use stepwise::{
    ApprovalDecision, EngineConfig, EngineEvent, EventBus, FileLockCoordinator, Orchestrator,
    PhaseKind, RunHandle, RunOptions,
};

use crate::support::{call, drain, orchestrator, phases, quiet_config};

fn approval_config() -> EngineConfig {
    EngineConfig {
        require_file_approval: true,
        ..quiet_config()
    }
}

fn gated(
    config: EngineConfig,
    provider: Arc<ScriptedProvider>,
    dir: &TempDir,
    gate: Arc<ChannelApprovalGate>,
) -> Arc<Orchestrator> {
    Arc::new(
        orchestrator(config, provider, vec![Arc::new(WriteFileTool)], dir.path())
            .with_approval_gate(gate),
    )
}

async fn next_approval(rx: &mut Receiver<EngineEvent>) -> ApprovalRequest {
    loop {
        match rx.recv().await {
            Some(EngineEvent::ApprovalRequested { request }) => return request,
            Some(_) => continue,
            None => panic!("run ended without requesting approval"),
        }
    }
}

fn write_call(path: &str, content: &str) -> Vec<stepwise::llm::ToolCall> {
    vec![call("w1", "write_file", json!({"path": path, "content": content}))]
}

// ============================================================================
// Approval decisions
// ============================================================================

#[tokio::test]
async fn test_rejected_write_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("config.toml", "port = 8080\n"))
            .then_text("Left the config alone."),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let orch = gated(approval_config(), provider.clone(), &dir, gate.clone());
    let (events, mut rx) = EventBus::channel(128);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run("set the port", RunOptions::default(), events).await }
    });

    let request = next_approval(&mut rx).await;
    assert!(matches!(request.operation, FileOperation::Create));
    assert_eq!(request.path, "config.toml");
    assert!(request.proposed_diff.contains("+port = 8080"));
    assert!(
        gate.resolve(&request.request_id, ApprovalDecision::rejected("keep defaults"))
            .await
    );

    let outcome = run.await.unwrap();
    assert_eq!(outcome.phase, PhaseKind::Completed);
    assert!(!dir.path().join("config.toml").exists());
    assert!(provider.requests()[1]
        .transcript()
        .contains("was rejected by the user"));

    let seen = drain(&mut rx);
    assert!(seen.iter().any(|e| matches!(
        e,
        EngineEvent::ToolStatus { status: ToolStatus::Rejected, .. }
    )));
    assert!(phases(&seen).contains(&PhaseKind::Executing));
}

fn numbered_lines(capitalized: &[usize]) -> String {
    (1..=16)
        .map(|i| {
            if capitalized.contains(&i) {
                format!("LINE {}\n", i)
            } else {
                format!("line {}\n", i)
            }
        })
        .collect()
}

#[tokio::test]
async fn test_partial_approval_applies_accepted_hunks_only() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("lines.txt");
    std::fs::write(&file, numbered_lines(&[])).unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("lines.txt", &numbered_lines(&[2, 15])))
            .then_text("Capitalized what was approved."),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let orch = gated(approval_config(), provider, &dir, gate.clone());
    let (events, mut rx) = EventBus::channel(128);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run("capitalize", RunOptions::default(), events).await }
    });

    let request = next_approval(&mut rx).await;
    assert!(matches!(request.operation, FileOperation::Modify));
    assert_eq!(request.hunk_count, 2);
    assert_eq!(request.proposed_diff.matches("@@ -").count(), request.hunk_count);
    gate.resolve(
        &request.request_id,
        ApprovalDecision::Partial {
            hunks: vec![
                HunkDecision { index: 0, accepted: true },
                HunkDecision { index: 1, accepted: false },
            ],
            modified_content: None,
        },
    )
    .await;

    let outcome = run.await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), numbered_lines(&[2]));
}

#[tokio::test]
async fn test_partial_approval_of_shared_hunk_keeps_every_change_in_it() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("letters.txt");
    std::fs::write(&file, "a\nb\nc\nd\ne\nf\ng\n").unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("letters.txt", "a\nB\nc\nd\ne\nF\ng\n"))
            .then_text("Capitalized."),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let orch = gated(approval_config(), provider, &dir, gate.clone());
    let (events, mut rx) = EventBus::channel(128);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run("capitalize", RunOptions::default(), events).await }
    });

    let request = next_approval(&mut rx).await;
    assert_eq!(request.hunk_count, 1);
    assert_eq!(request.proposed_diff.matches("@@ -").count(), 1);
    gate.resolve(
        &request.request_id,
        ApprovalDecision::Partial {
            hunks: vec![HunkDecision { index: 0, accepted: true }],
            modified_content: None,
        },
    )
    .await;

    assert!(run.await.unwrap().is_clean());
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "a\nB\nc\nd\ne\nF\ng\n"
    );
}

#[tokio::test]
async fn test_partial_approval_with_edited_content() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.toml");
    std::fs::write(&file, "port = 80\nhost = \"localhost\"\n").unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("config.toml", "port = 8080\nhost = \"0.0.0.0\"\n"))
            .then_text("Updated."),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let orch = gated(approval_config(), provider, &dir, gate.clone());
    let (events, mut rx) = EventBus::channel(128);

    let run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.run("open the port", RunOptions::default(), events).await }
    });

    let request = next_approval(&mut rx).await;
    gate.resolve(
        &request.request_id,
        ApprovalDecision::Partial {
            hunks: vec![],
            modified_content: Some("port = 8080\nhost = \"localhost\"\n".to_string()),
        },
    )
    .await;

    run.await.unwrap();
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "port = 8080\nhost = \"localhost\"\n"
    );
}

#[tokio::test]
async fn test_approval_timeout_counts_as_rejection() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("late.txt", "too late"))
            .then_text("Nobody answered."),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let config = EngineConfig {
        approval_timeout_secs: Some(1),
        ..approval_config()
    };
    let orch = gated(config, provider.clone(), &dir, gate.clone());

    let outcome = orch
        .run("write late", RunOptions::default(), EventBus::disconnected())
        .await;

    assert_eq!(outcome.phase, PhaseKind::Completed);
    assert!(!dir.path().join("late.txt").exists());
    assert!(gate.pending_requests().await.is_empty());
    assert!(provider.requests()[1]
        .transcript()
        .contains("was rejected by the user"));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_approval() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o").then_tools(write_call("never.txt", "never")),
    );
    let gate = Arc::new(ChannelApprovalGate::new());
    let orch = gated(approval_config(), provider.clone(), &dir, gate.clone());
    let handle = RunHandle::new();
    let (events, mut rx) = EventBus::channel(128);

    let run = tokio::spawn({
        let orch = orch.clone();
        let options = RunOptions::default().with_handle(handle.clone());
        async move { orch.run("write never", options, events).await }
    });

    next_approval(&mut rx).await;
    handle.cancel();

    let outcome = run.await.unwrap();
    assert!(outcome.is_cancelled());
    assert!(outcome.error.is_none());
    assert!(!dir.path().join("never.txt").exists());
    assert!(gate.pending_requests().await.is_empty());
    // No LLM call after cancellation.
    assert_eq!(provider.requests().len(), 1);

    let seen = drain(&mut rx);
    let kinds = phases(&seen);
    assert_eq!(kinds.last(), Some(&PhaseKind::Cancelled));
    assert!(!kinds.contains(&PhaseKind::Completed));
}

// ============================================================================
// File locks
// ============================================================================

/// Mutating tool that holds its file until the run is cancelled.
fn holding_tool() -> Arc<dyn Tool> {
    Arc::new(
        FunctionTool::new(
            "hold_file",
            "Keep a file open for editing",
            ParameterSchema::object(None, HashMap::new(), vec![]),
            ToolCapability::Write,
            |ctx, _args| {
                let token = ctx.cancellation_token().clone();
                Box::pin(async move {
                    tokio::select! {
                        _ = token.cancelled() => ToolResult::err("interrupted"),
                        _ = tokio::time::sleep(Duration::from_secs(5)) => ToolResult::ok("held"),
                    }
                })
            },
        )
        .with_mutation_target("path"),
    )
}

#[tokio::test]
async fn test_cancelled_run_releases_its_locks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.txt");
    let locks = FileLockCoordinator::new();

    let holder_provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(vec![call("h1", "hold_file", json!({"path": "shared.txt"}))]),
    );
    let holder = Arc::new(
        orchestrator(quiet_config(), holder_provider, vec![holding_tool()], dir.path())
            .with_file_locks(locks.clone()),
    );
    let handle = RunHandle::new();
    let run = tokio::spawn({
        let holder = holder.clone();
        let options = RunOptions::default().with_handle(handle.clone());
        async move { holder.run("hold the file", options, EventBus::disconnected()).await }
    });

    tokio::time::timeout(Duration::from_secs(2), async {
        while locks.holder(&path).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("holder run should take the lock");
    assert_eq!(locks.holder(&path).as_deref(), Some(handle.run_id()));

    handle.cancel();
    let outcome = run.await.unwrap();
    assert!(outcome.is_cancelled());
    assert!(locks.holder(&path).is_none());

    // A second run takes the same path without waiting.
    let writer_provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("shared.txt", "second run"))
            .then_text("Wrote it."),
    );
    let writer = orchestrator(
        quiet_config(),
        writer_provider,
        vec![Arc::new(WriteFileTool)],
        dir.path(),
    )
    .with_file_locks(locks.clone());
    let (events, mut rx) = EventBus::channel(128);

    let second = tokio::time::timeout(
        Duration::from_secs(2),
        writer.run("write the file", RunOptions::default(), events),
    )
    .await
    .expect("second run should not wait for the lock");

    assert!(second.is_clean());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second run");
    let waited = drain(&mut rx).iter().any(|e| matches!(
        e,
        EngineEvent::PhaseChanged { phase: ExecutionPhase::WaitingForFileLock { .. }, .. }
    ));
    assert!(!waited);
}

#[tokio::test]
async fn test_writer_waits_for_lock_held_elsewhere() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("busy.txt");
    let locks = FileLockCoordinator::new();
    let guard = locks.try_acquire(&path, "other-run").unwrap();

    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(write_call("busy.txt", "after wait"))
            .then_text("Done."),
    );
    let writer = Arc::new(
        orchestrator(quiet_config(), provider, vec![Arc::new(WriteFileTool)], dir.path())
            .with_file_locks(locks.clone()),
    );
    let (events, mut rx) = EventBus::channel(128);
    let run = tokio::spawn({
        let writer = writer.clone();
        async move { writer.run("write busy", RunOptions::default(), events).await }
    });

    loop {
        match rx.recv().await {
            Some(EngineEvent::PhaseChanged {
                phase: ExecutionPhase::WaitingForFileLock { path: waiting },
                ..
            }) => {
                assert_eq!(waiting, "busy.txt");
                break;
            }
            Some(_) => continue,
            None => panic!("run ended without waiting for the lock"),
        }
    }
    assert!(!path.exists());
    drop(guard);

    let outcome = run.await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "after wait");
}
