//! Builders shared by the integration suites.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::Receiver;

use stepwise::llm::mock::ScriptedProvider;
use stepwise::llm::{ParameterSchema, ToolCall};
use stepwise::tools::{FunctionTool, Tool, ToolCapability, ToolRegistry, ToolResult};
use stepwise::{EngineConfig, EngineEvent, Orchestrator, PhaseKind};

/// Defaults with retries, reflection and approval out of the way.
pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        decision_backoff_ms: 1,
        require_file_approval: false,
        reflection_enabled: false,
        auto_profile_on_task_start: false,
        ..EngineConfig::default()
    }
}

pub fn orchestrator(
    config: EngineConfig,
    provider: Arc<ScriptedProvider>,
    tools: Vec<Arc<dyn Tool>>,
    working_dir: &Path,
) -> Orchestrator {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Orchestrator::new(config, provider, Arc::new(registry), working_dir.to_path_buf())
}

/// Tool double whose `n`th call (0-based) succeeds when `outcomes[n]` is true.
/// Calls past the end repeat the last outcome.
pub fn scripted_tool(
    name: &str,
    capability: ToolCapability,
    outcomes: Vec<bool>,
) -> (Arc<dyn Tool>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let tool = FunctionTool::new(
        name,
        "Test double",
        ParameterSchema::object(None, HashMap::new(), vec![]),
        capability,
        move |_ctx, _args| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let ok = outcomes
                .get(n)
                .or_else(|| outcomes.last())
                .copied()
                .unwrap_or(true);
            Box::pin(async move {
                if ok {
                    ToolResult::ok("ok")
                } else {
                    ToolResult::err("1 failing test: GET /health returned 404")
                }
            })
        },
    );
    (Arc::new(tool), calls)
}

pub fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

pub fn drain(rx: &mut Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

pub fn phases(events: &[EngineEvent]) -> Vec<PhaseKind> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PhaseChanged { phase, .. } => Some(phase.kind()),
            _ => None,
        })
        .collect()
}
