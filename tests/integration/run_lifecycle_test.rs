//! Run Lifecycle Integration Tests
//!
//! Drives full runs and checks what observers see: the phase sequence,
//! checklist snapshots and summarization before an LLM call.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_stream::StreamExt;

use stepwise::llm::mock::ScriptedProvider;
use stepwise::llm::ParameterSchema;
use stepwise::services::context::ExtractiveCompactor;
use stepwise::tools::{FunctionTool, Tool, ToolCapability, ToolResult};
use stepwise::{
    EngineConfig, EngineEvent, EventBus, PhaseKind, RunCaveat, RunOptions, TaskStatus,
};

use crate::support::{call, drain, orchestrator, phases, quiet_config, scripted_tool};

const HEALTH_TASKS: [&str; 3] = ["add route", "add handler", "write test"];

fn checklist_snapshots(events: &[EngineEvent]) -> Vec<Vec<TaskStatus>> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ChecklistUpdated { items, .. } => {
                Some(items.iter().map(|i| i.status).collect())
            }
            _ => None,
        })
        .collect()
}

/// Plan, two edits, a failing test run, then whatever `tail` scripts.
fn health_endpoint_provider(tail: impl FnOnce(ScriptedProvider) -> ScriptedProvider) -> ScriptedProvider {
    let provider = ScriptedProvider::new("gpt-4o")
        .then_tools(vec![
            call(
                "c1",
                "plan_tasks",
                json!({"goal": "add a health endpoint", "tasks": HEALTH_TASKS}),
            ),
            call("c2", "edit_file", json!({})),
        ])
        .then_text("Route added.")
        .then_tools(vec![call("c3", "edit_file", json!({}))])
        .then_text("Handler added.")
        .then_tools(vec![call("c4", "run_tests", json!({}))])
        .then_text("The test fails: /health returns 404.");
    tail(provider)
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_completes_only_after_tests_pass() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(health_endpoint_provider(|p| {
        p.then_tools(vec![call("c5", "run_tests", json!({}))])
            .then_text("Tests pass.")
            .with_responder(|system, _| {
                system
                    .contains("says it is done")
                    .then(|| r#"{"complete": false, "reason": "the test still fails"}"#.to_string())
            })
    }));
    let (edit, edits) = scripted_tool("edit_file", ToolCapability::Write, vec![true]);
    let (tests, test_runs) = scripted_tool("run_tests", ToolCapability::Execute, vec![false, true]);
    let orch = orchestrator(quiet_config(), provider.clone(), vec![edit, tests], dir.path());
    let (events, mut rx) = EventBus::channel(512);

    let outcome = orch
        .run("add a health endpoint", RunOptions::default(), events)
        .await;

    assert!(outcome.is_clean(), "unexpected outcome: {:?}", outcome);
    assert!(outcome.goal_satisfied);
    assert_eq!(outcome.iterations, 4);
    assert_eq!(edits.load(Ordering::SeqCst), 2);
    assert_eq!(test_runs.load(Ordering::SeqCst), 2);
    assert!(outcome
        .checklist
        .iter()
        .all(|i| i.status == TaskStatus::Completed));

    let seen = drain(&mut rx);
    let snapshots = checklist_snapshots(&seen);
    // After the failing test run the third item stays open.
    assert!(snapshots.contains(&vec![
        TaskStatus::Completed,
        TaskStatus::Completed,
        TaskStatus::InProgress
    ]));
    for snapshot in &snapshots {
        let in_progress = snapshot
            .iter()
            .filter(|s| **s == TaskStatus::InProgress)
            .count();
        assert!(in_progress <= 1, "two items in progress: {:?}", snapshot);
    }

    // Verification was consulted once, after the failing step.
    let verifications = provider
        .prompts()
        .iter()
        .filter(|(system, _)| system.contains("says it is done"))
        .count();
    assert_eq!(verifications, 1);
    let fourth_step = &provider.requests()[6];
    assert!(fourth_step
        .system
        .as_deref()
        .unwrap_or_default()
        .contains("[verification] not complete (the test still fails)"));

    let kinds = phases(&seen);
    assert_eq!(kinds.first(), Some(&PhaseKind::Starting));
    assert_eq!(kinds.last(), Some(&PhaseKind::Completed));
    assert_eq!(kinds.iter().filter(|k| k.is_terminal()).count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == PhaseKind::Verifying).count(), 2);
}

#[tokio::test]
async fn test_health_endpoint_done_decision_overrides_failing_test() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(health_endpoint_provider(|p| {
        p.with_responder(|system, _| {
            system.contains("says it is done").then(|| {
                r#"{"complete": true, "reason": "the test belongs to another ticket"}"#.to_string()
            })
        })
    }));
    let (edit, _) = scripted_tool("edit_file", ToolCapability::Write, vec![true]);
    let (tests, _) = scripted_tool("run_tests", ToolCapability::Execute, vec![false]);
    let orch = orchestrator(quiet_config(), provider, vec![edit, tests], dir.path());

    let outcome = orch
        .run("add a health endpoint", RunOptions::default(), EventBus::disconnected())
        .await;

    assert_eq!(outcome.phase, PhaseKind::Completed);
    assert_eq!(outcome.caveat, Some(RunCaveat::VerificationOverride));
    assert!(outcome.goal_satisfied);
    assert_eq!(outcome.iterations, 3);
    let statuses: Vec<TaskStatus> = outcome.checklist.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![TaskStatus::Completed, TaskStatus::Completed, TaskStatus::Skipped]
    );
}

#[tokio::test]
async fn test_failing_tests_without_override_hit_iteration_limit() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(health_endpoint_provider(|p| {
        p.with_responder(|system, _| {
            system
                .contains("says it is done")
                .then(|| r#"{"complete": false, "reason": "tests fail"}"#.to_string())
        })
    }));
    let (edit, _) = scripted_tool("edit_file", ToolCapability::Write, vec![true]);
    let (tests, _) = scripted_tool("run_tests", ToolCapability::Execute, vec![false]);
    let config = EngineConfig {
        max_iterations: 3,
        ..quiet_config()
    };
    let orch = orchestrator(config, provider, vec![edit, tests], dir.path());

    let outcome = orch
        .run("add a health endpoint", RunOptions::default(), EventBus::disconnected())
        .await;

    assert_eq!(outcome.caveat, Some(RunCaveat::IterationLimit));
    assert!(!outcome.goal_satisfied);
    assert_eq!(outcome.checklist[2].status, TaskStatus::InProgress);
}

// ============================================================================
// Context budget
// ============================================================================

#[tokio::test]
async fn test_log_over_budget_is_summarized_before_next_llm_call() {
    let dir = TempDir::new().unwrap();
    let dump: Arc<dyn Tool> = Arc::new(FunctionTool::new(
        "dump_logs",
        "Print the service log",
        ParameterSchema::object(None, HashMap::new(), vec![]),
        ToolCapability::Read,
        |_ctx, _args| Box::pin(async move { ToolResult::ok("z".repeat(20_000)) }),
    ));
    let provider = Arc::new(
        ScriptedProvider::new("gpt-4o")
            .then_tools(vec![call("c1", "dump_logs", json!({}))])
            .then_text("The log shows nothing unusual."),
    );
    let config = EngineConfig {
        context_limit_override: Some(32_000),
        ..quiet_config()
    };
    let orch = orchestrator(config, provider.clone(), vec![dump], dir.path())
        .with_compactor(Arc::new(ExtractiveCompactor::new("gpt-4o")));
    // 14 entries of ~1,900 tokens: under the 30,400 token threshold until
    // the tool output lands.
    let seed: Vec<String> = (0..14)
        .map(|i| format!("entry {:03} {}", i, "y".repeat(7_590)))
        .collect();
    let (events, mut rx) = EventBus::channel(128);

    let outcome = orch
        .run(
            "investigate the outage",
            RunOptions::default().with_initial_context(seed),
            events,
        )
        .await;

    assert!(outcome.is_clean());
    assert_eq!(outcome.summarizations, 1);
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0]
        .system
        .as_deref()
        .unwrap_or_default()
        .contains("[SUMMARIZED HISTORY]"));
    assert!(requests[1]
        .system
        .as_deref()
        .unwrap_or_default()
        .contains("[SUMMARIZED HISTORY]"));

    let seen = drain(&mut rx);
    let summarized = seen.iter().find_map(|e| match e {
        EngineEvent::ContextSummarized {
            tokens_before,
            tokens_after,
            ..
        } => Some((*tokens_before, *tokens_after)),
        _ => None,
    });
    let (before, after) = summarized.expect("summarization event");
    assert!(before > 26_000);
    assert!(after < before);
    assert!(phases(&seen).contains(&PhaseKind::Summarizing));
}

// ============================================================================
// Streaming entry point
// ============================================================================

#[tokio::test]
async fn test_run_stream_ends_with_run_finished() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new("gpt-4o").then_text("Nothing to do."));
    let orch = Arc::new(orchestrator(quiet_config(), provider, vec![], dir.path()));

    let events: Vec<EngineEvent> = orch
        .run_stream("check status", RunOptions::default())
        .collect()
        .await;

    match events.last() {
        Some(EngineEvent::RunFinished { outcome }) => {
            assert_eq!(outcome.phase, PhaseKind::Completed);
            assert_eq!(outcome.response.as_deref(), Some("Nothing to do."));
        }
        other => panic!("expected RunFinished, got {:?}", other),
    }
    assert_eq!(phases(&events).first(), Some(&PhaseKind::Starting));
}

#[tokio::test]
async fn test_streaming_forwards_provider_events() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new("gpt-4o").then_text("Streamed reply."));
    let config = EngineConfig {
        streaming: true,
        ..quiet_config()
    };
    let orch = orchestrator(config, provider, vec![], dir.path());
    let (events, mut rx) = EventBus::channel(256);

    let outcome = orch.run("say hello", RunOptions::default(), events).await;

    assert_eq!(outcome.response.as_deref(), Some("Streamed reply."));
    let streamed = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, EngineEvent::Stream { .. }))
        .count();
    assert!(streamed > 0);
}
