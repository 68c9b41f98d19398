//! Orchestrator Service
//!
//! Drives one run from `Starting` to a terminal phase:
//!
//! 1. drain queued feedback into the context log
//! 2. periodic reflection, stuck check
//! 3. checklist auto-progression (and profile retargeting on task start)
//! 4. the step's tool loop: summarize when over budget, call the LLM,
//!    dispatch tool calls, repeat until a text-only reply
//! 5. auto-complete the step's item, then verify before completing
//!
//! Collaborators (provider, registry, approval gate, lock coordinator,
//! compactor) are injected at construction so runs can be built in
//! isolation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use stepwise_llm::{
    estimate_message_tokens, LlmError, LlmProvider, LlmRequestOptions, LlmResponse, Message,
    ToolDefinition, UsageStats,
};
use stepwise_tools::{ToolCapability, ToolRegistry};

use crate::models::checklist::{TaskChecklistItem, TaskStatus};
use crate::models::outcome::{RunCaveat, RunOutcome};
use crate::models::phase::ExecutionPhase;
use crate::models::settings::EngineConfig;
use crate::services::approval::{ApprovalGate, AutoApprove};
use crate::services::checklist::ChecklistTracker;
use crate::services::context::{
    truncate_output, ContextBudget, ContextCompactor, ContextWindowManager, LlmSummaryCompactor,
};
use crate::services::decision::DecisionClient;
use crate::services::events::{EngineEvent, EventBus};
use crate::services::file_lock::FileLockCoordinator;
use crate::services::profile::ProfileSelector;
use crate::services::stuck::StuckDetector;
use crate::utils::error::{EngineError, EngineResult};

use super::bookkeeping;
use super::prompts::{
    reflection_prompt, stuck_prompt, system_prompt, system_prompt_header, verification_prompt,
    SystemPromptInput, REFLECTION_SYSTEM_PROMPT, STUCK_SYSTEM_PROMPT, VERIFICATION_SYSTEM_PROMPT,
};
use super::run::{RunHandle, RunOptions, RunState};
use super::state_machine::PhaseMachine;

const EVENT_BUFFER: usize = 256;
const STREAM_BUFFER: usize = 64;
/// Characters of the context log shown to decision prompts.
const DECISION_LOG_CHARS: usize = 4_000;

/// How one step's tool loop ended.
#[derive(Debug, Default)]
struct StepReport {
    /// Final text; `None` when the loop cap was hit
    response: Option<String>,
    /// Registry tools dispatched (bookkeeping excluded)
    tools_run: usize,
    failures: usize,
    /// Items that became terminal during the step
    finished_items: usize,
}

impl StepReport {
    fn all_succeeded(&self) -> bool {
        self.tools_run > 0 && self.failures == 0
    }
}

pub struct Orchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) approval: Arc<dyn ApprovalGate>,
    pub(crate) locks: Arc<FileLockCoordinator>,
    pub(crate) compactor: Arc<dyn ContextCompactor>,
    pub(crate) decisions: DecisionClient,
    pub(crate) working_dir: PathBuf,
    pub(crate) session_id: String,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let compactor: Arc<dyn ContextCompactor> = Arc::new(LlmSummaryCompactor::new(
            provider.clone(),
            Duration::from_secs(config.llm_timeout_secs),
        ));
        let decisions = DecisionClient::new(provider.clone(), &config);
        Self {
            config,
            provider,
            registry,
            approval: Arc::new(AutoApprove),
            locks: FileLockCoordinator::new(),
            compactor,
            decisions,
            working_dir: working_dir.into(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval = gate;
        self
    }

    /// Share a lock coordinator with other orchestrators.
    pub fn with_file_locks(mut self, locks: Arc<FileLockCoordinator>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_compactor(mut self, compactor: Arc<dyn ContextCompactor>) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn file_locks(&self) -> &Arc<FileLockCoordinator> {
        &self.locks
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Run `goal` to a terminal phase, reporting progress on `events`.
    pub async fn run(&self, goal: &str, options: RunOptions, events: EventBus) -> RunOutcome {
        let mut run = self.start_run(goal, options, events);
        let result = self.drive(&mut run).await;
        let error = match result {
            Ok(()) => None,
            Err(e) if e.is_cancelled() => {
                info!("[orchestrator] run {} cancelled", run.run_id);
                Some(e)
            }
            Err(e) => {
                error!("[orchestrator] run {} failed: {}", run.run_id, e);
                Some(e)
            }
        };
        self.finish(run, error).await
    }

    /// Spawn the run and return its event stream.
    ///
    /// The stream ends after `RunFinished`. Cancel through the handle in
    /// `options`.
    pub fn run_stream(
        self: &Arc<Self>,
        goal: impl Into<String>,
        options: RunOptions,
    ) -> ReceiverStream<EngineEvent> {
        let (events, rx) = EventBus::channel(EVENT_BUFFER);
        let orchestrator = Arc::clone(self);
        let goal = goal.into();
        tokio::spawn(async move {
            orchestrator.run(&goal, options, events).await;
        });
        ReceiverStream::new(rx)
    }

    /// Fresh handle for a run about to start.
    pub fn new_handle(&self) -> RunHandle {
        RunHandle::new()
    }

    fn start_run(&self, goal: &str, options: RunOptions, events: EventBus) -> RunState {
        let budget = ContextBudget::from_config(&self.config);
        let mut window = ContextWindowManager::new(
            budget,
            self.config.summarize_threshold,
            self.config.recent_entries(),
        );
        for entry in &options.initial_context {
            window.append(entry);
        }

        let mut profile = ProfileSelector::new(self.config.profile);
        if let Some(previous) = options.profile {
            profile.switch_if_needed(previous, "carried over from the previous run");
        }

        RunState {
            run_id: options.handle.run_id().to_string(),
            goal: goal.trim().to_string(),
            handle: options.handle,
            events,
            phases: PhaseMachine::new(self.config.strict_transitions),
            checklist: ChecklistTracker::new(),
            window,
            stuck: StuckDetector::new(
                self.config.stuck_window,
                self.config.stuck_similarity_threshold,
            ),
            profile,
            checkpoint: options.checkpoint,
            history: options.history,
            usage: UsageStats::default(),
            iterations: 0,
            caveat: None,
            response: None,
            goal_satisfied: false,
        }
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    async fn drive(&self, run: &mut RunState) -> EngineResult<()> {
        run.enter(ExecutionPhase::Starting).await?;
        info!(
            "[orchestrator] run {} started in {} mode: {}",
            run.run_id,
            self.config.agent_mode.as_str(),
            run.goal
        );

        loop {
            if run.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let max = self.config.max_iterations;
            if max > 0 && run.iterations >= max {
                warn!("[orchestrator] run {} hit the {}-step limit", run.run_id, max);
                run.caveat = Some(RunCaveat::IterationLimit);
                if run.response.is_none() {
                    run.response = Some(format!("Stopped after reaching the limit of {} steps.", max));
                }
                return Ok(());
            }

            run.iterations += 1;
            self.drain_feedback(run).await;
            let phase = run.executing();
            run.enter(phase).await?;

            if self.reflection_due(run.iterations) {
                self.reflect(run).await?;
            }

            if run.stuck.is_stuck() && self.check_stuck(run).await? {
                run.caveat = Some(RunCaveat::Stuck);
                run.response = Some(
                    "Stopped: the same commands kept repeating without progress.".to_string(),
                );
                return Ok(());
            }

            if self.advance_checklist(run).await? {
                run.emit_checklist().await;
            }

            let step_item = run.checklist.current().map(|i| i.id);
            let report = self.run_step(run).await?;

            let Some(text) = report.response.clone() else {
                let limit = self.config.max_tool_loops;
                warn!(
                    "[orchestrator] step {} used all {} tool rounds",
                    run.iterations, limit
                );
                run.caveat = Some(RunCaveat::ToolLoopLimit);
                run.response = Some(format!(
                    "Reached the limit of {} tool rounds in one step without a final answer.",
                    limit
                ));
                return Ok(());
            };

            let clipped = truncate_output(&text, run.window.budget().output_capture_chars());
            run.window.append(format!("[assistant] {}", clipped));
            run.response = Some(text.clone());

            let finished = report.finished_items + self.auto_complete(run, step_item, &report).await?;

            if run.checklist.is_empty() || run.checklist.all_terminal() {
                run.enter(ExecutionPhase::Verifying).await?;
                run.goal_satisfied = true;
                return Ok(());
            }
            if finished > 0 {
                debug!(
                    "[orchestrator] step {} finished {} item(s); {} remaining",
                    run.iterations,
                    finished,
                    run.checklist.remaining().len()
                );
                continue;
            }
            if self.verify(run, &text).await? {
                return Ok(());
            }
        }
    }

    /// One step: LLM rounds until a text-only reply or the round cap.
    async fn run_step(&self, run: &mut RunState) -> EngineResult<StepReport> {
        let mut report = StepReport::default();
        let mut step_messages: Vec<Message> = Vec::new();
        let terminal_before = count_terminal(run.checklist.items());

        for round in 1..=self.config.max_tool_loops {
            if run.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let messages = self.request_messages(run, &step_messages);
            let (mut system, header_tokens) = self.build_system_prompt(run);
            let prompt_tokens =
                header_tokens.saturating_add(estimate_message_tokens(&messages, &self.config.model));
            if run.window.needs_summarization(prompt_tokens) {
                self.summarize_context(run, prompt_tokens).await?;
                system = self.build_system_prompt(run).0;
            }

            let response = self
                .call_llm(run, messages, system, self.tool_schemas())
                .await?;
            run.usage.accumulate(&response.usage);

            if response.has_tool_calls() {
                step_messages.push(Message::assistant_with_tools(
                    response.content.as_deref(),
                    &response.tool_calls,
                ));
                for call in &response.tool_calls {
                    if run.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    let dispatched = self.dispatch(run, call).await?;
                    if !dispatched.bookkeeping {
                        report.tools_run += 1;
                        if !dispatched.result.success {
                            report.failures += 1;
                        }
                    }
                    step_messages.push(Message::tool_result(
                        &call.id,
                        dispatched.content,
                        !dispatched.result.success,
                    ));
                }
                continue;
            }

            if let Some(text) = response.text_content() {
                report.response = Some(text.to_string());
                break;
            }
            warn!(
                "[orchestrator] round {} of step {} returned neither text nor tool calls",
                round, run.iterations
            );
        }

        report.finished_items = count_terminal(run.checklist.items()).saturating_sub(terminal_before);
        Ok(report)
    }

    fn request_messages(&self, run: &RunState, step_messages: &[Message]) -> Vec<Message> {
        let mut messages = run.history.clone();
        messages.push(Message::user(run.goal.clone()));
        messages.extend_from_slice(step_messages);
        messages
    }

    /// Full system prompt and the token cost of everything but the log.
    fn build_system_prompt(&self, run: &RunState) -> (String, u32) {
        let checklist = if run.checklist.is_empty() {
            String::new()
        } else {
            run.checklist.render()
        };
        let log = run.window.render();
        let input = SystemPromptInput {
            goal: &run.goal,
            working_dir: &self.working_dir,
            mode: self.config.agent_mode,
            profile: run.profile.active(),
            checklist: &checklist,
            current_task: run.checklist.current(),
            context_log: &log,
        };
        let header_tokens = run.window.budget().estimate(&system_prompt_header(&input));
        (system_prompt(&input), header_tokens)
    }

    fn tool_schemas(&self) -> Vec<ToolDefinition> {
        let mode = self.config.agent_mode;
        let mut tools = self.registry.schemas(mode, self.provider.as_ref());
        if self.provider.supports_tools() && mode.allows(ToolCapability::Bookkeeping) {
            tools.extend(bookkeeping::definitions());
        }
        tools
    }

    async fn call_llm(
        &self,
        run: &RunState,
        messages: Vec<Message>,
        system: String,
        tools: Vec<ToolDefinition>,
    ) -> EngineResult<LlmResponse> {
        let cancel = run.cancel_token();
        let limit = Duration::from_secs(self.config.llm_timeout_secs);
        let options = LlmRequestOptions::default();

        let call = async {
            if self.config.streaming {
                let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
                let events = run.events.clone();
                let run_id = run.run_id.clone();
                let forward = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        events
                            .emit(EngineEvent::Stream {
                                run_id: run_id.clone(),
                                event,
                            })
                            .await;
                    }
                });
                let result = self
                    .provider
                    .stream_message(messages, Some(system), tools, tx, options)
                    .await;
                let _ = forward.await;
                result
            } else {
                self.provider
                    .send_message(messages, Some(system), tools, options)
                    .await
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(LlmError::Timeout {
                    seconds: self.config.llm_timeout_secs,
                }
                .into()),
            },
        }
    }

    async fn summarize_context(&self, run: &mut RunState, prompt_tokens: u32) -> EngineResult<()> {
        run.enter(ExecutionPhase::Summarizing).await?;
        let report = run
            .window
            .summarize(prompt_tokens, self.compactor.as_ref())
            .await?;
        if let Some(report) = report {
            run.events
                .emit(EngineEvent::ContextSummarized {
                    run_id: run.run_id.clone(),
                    tokens_before: report.tokens_before,
                    tokens_after: report.tokens_after,
                    summarization_count: report.summarization_count,
                })
                .await;
        }
        let phase = run.executing();
        run.enter(phase).await
    }

    // ========================================================================
    // Safe-point checks
    // ========================================================================

    async fn drain_feedback(&self, run: &mut RunState) {
        for text in run.handle.drain_feedback() {
            debug!("[orchestrator] feedback accepted for run {}", run.run_id);
            run.window.append(format!("[feedback] {}", text));
            run.events
                .emit(EngineEvent::FeedbackAccepted {
                    run_id: run.run_id.clone(),
                    text,
                })
                .await;
        }
    }

    fn reflection_due(&self, iteration: u32) -> bool {
        self.config.reflection_enabled
            && iteration > 1
            && self.config.reflection_interval > 0
            && iteration % self.config.reflection_interval == 0
    }

    async fn reflect(&self, run: &mut RunState) -> EngineResult<()> {
        run.enter(ExecutionPhase::Reflecting).await?;
        let prompt = reflection_prompt(
            &run.goal,
            &run.checklist.render(),
            &run.log_tail(DECISION_LOG_CHARS),
            run.profile.active().reflection_focus(),
        );
        let decision = self
            .decisions
            .ask(REFLECTION_SYSTEM_PROMPT, &prompt, &run.cancel_token())
            .await?;

        if decision.is_empty() {
            debug!("[orchestrator] reflection produced no usable answer");
        } else {
            let progress = decision
                .u64("progress_percent")
                .map(|p| p.min(100) as u8)
                .unwrap_or_else(|| run.checklist.progress_percent());
            let on_track = decision.bool("on_track").unwrap_or(true);
            let mut line = format!(
                "[reflection] progress {}%, {}",
                progress,
                if on_track { "on track" } else { "off track" }
            );
            if let Some(approach) = decision.str("new_approach").filter(|a| !a.trim().is_empty()) {
                line.push_str(&format!("; new approach: {}", approach.trim()));
            }
            info!("[orchestrator] {}", line);
            run.window.append(line);

            if !on_track && run.profile.selection().is_auto() {
                let task = run
                    .checklist
                    .current()
                    .map(|i| i.description.clone())
                    .unwrap_or_else(|| run.goal.clone());
                self.retarget_profile(run, &task).await?;
            }
        }

        let phase = run.executing();
        run.enter(phase).await
    }

    /// Ask whether the run is stuck. Returns true when it should stop.
    async fn check_stuck(&self, run: &mut RunState) -> EngineResult<bool> {
        let commands: Vec<String> = run.stuck.recent().into_iter().map(String::from).collect();
        warn!(
            "[orchestrator] last {} commands are near-identical: {:?}",
            commands.len(),
            commands
        );
        let listed: Vec<&str> = commands.iter().map(String::as_str).collect();
        let prompt = stuck_prompt(&run.goal, &listed, &run.log_tail(DECISION_LOG_CHARS));
        let decision = self
            .decisions
            .ask(STUCK_SYSTEM_PROMPT, &prompt, &run.cancel_token())
            .await?;

        if !decision.bool("stuck").unwrap_or(false) {
            run.stuck.reset();
            return Ok(false);
        }
        if decision.bool("stop").unwrap_or(false) {
            run.window.append("[stuck] no workable approach left; stopping");
            run.notice("The agent is stuck and has stopped.").await;
            return Ok(true);
        }
        if let Some(approach) = decision.str("new_approach").filter(|a| !a.trim().is_empty()) {
            let approach = approach.trim().to_string();
            run.window.append(format!("[strategy] {}", approach));
            run.notice(format!("Changing approach: {}", approach)).await;
        }
        run.stuck.reset();
        Ok(false)
    }

    /// Promote the next pending item. Returns whether one was started.
    pub(crate) async fn advance_checklist(&self, run: &mut RunState) -> EngineResult<bool> {
        let Some(item) = run.checklist.promote_next().cloned() else {
            return Ok(false);
        };
        debug!("[orchestrator] started item {}: {}", item.id, item.description);
        if self.config.auto_profile_on_task_start && run.profile.selection().is_auto() {
            self.retarget_profile(run, &item.description).await?;
        }
        Ok(true)
    }

    async fn retarget_profile(&self, run: &mut RunState, task: &str) -> EngineResult<()> {
        let next_tasks: Vec<String> = run
            .checklist
            .items()
            .iter()
            .filter(|i| i.status == TaskStatus::Pending)
            .map(|i| i.description.clone())
            .collect();
        let recent = run.log_tail(DECISION_LOG_CHARS / 2);
        let analysis = run
            .profile
            .analyze(&self.decisions, task, &next_tasks, &recent, &run.cancel_token())
            .await?;
        if let Some(analysis) = analysis {
            if let Some(switch) = run.profile.switch_if_needed(analysis.profile, &analysis.reason) {
                run.record_switch(switch).await;
            }
        }
        Ok(())
    }

    /// Complete the step's item when every tool call of the step succeeded.
    async fn auto_complete(
        &self,
        run: &mut RunState,
        step_item: Option<u32>,
        report: &StepReport,
    ) -> EngineResult<usize> {
        let Some(id) = step_item.or_else(|| run.checklist.current().map(|i| i.id)) else {
            return Ok(0);
        };
        let in_progress = run
            .checklist
            .items()
            .iter()
            .any(|i| i.id == id && i.status == TaskStatus::InProgress);
        if !in_progress || !report.all_succeeded() {
            return Ok(0);
        }
        run.checklist
            .mark_completed(id, Some("all tool calls in the step succeeded".to_string()))?;
        info!("[orchestrator] auto-completed checklist item {}", id);
        self.advance_checklist(run).await?;
        run.emit_checklist().await;
        Ok(1)
    }

    /// Decide whether a text reply with open items ends the run.
    async fn verify(&self, run: &mut RunState, response: &str) -> EngineResult<bool> {
        run.enter(ExecutionPhase::Verifying).await?;
        let remaining: Vec<TaskChecklistItem> =
            run.checklist.remaining().into_iter().cloned().collect();
        let listed: Vec<&TaskChecklistItem> = remaining.iter().collect();
        let prompt = verification_prompt(&run.goal, &listed, response);
        let decision = self
            .decisions
            .ask(VERIFICATION_SYSTEM_PROMPT, &prompt, &run.cancel_token())
            .await?;
        let reason = decision
            .str("reason")
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("no reason given")
            .to_string();

        if decision.bool("complete").unwrap_or(false) {
            let skipped = run
                .checklist
                .skip_remaining(&format!("not needed: {}", reason));
            info!(
                "[orchestrator] verification accepted the result; skipped {} item(s)",
                skipped
            );
            run.caveat = Some(RunCaveat::VerificationOverride);
            run.goal_satisfied = true;
            run.emit_checklist().await;
            return Ok(true);
        }

        let open: Vec<String> = remaining
            .iter()
            .map(|i| format!("{}. {}", i.id, i.description))
            .collect();
        run.window.append(format!(
            "[verification] not complete ({}). Remaining: {}",
            reason,
            open.join("; ")
        ));
        let phase = run.executing();
        run.enter(phase).await?;
        Ok(false)
    }

    // ========================================================================
    // Termination
    // ========================================================================

    async fn finish(&self, mut run: RunState, error: Option<EngineError>) -> RunOutcome {
        let cancelled = error.as_ref().map(|e| e.is_cancelled()).unwrap_or(false);

        let released = self.locks.release_all(&run.run_id);
        if released > 0 {
            debug!("[orchestrator] run {} released {} lock(s)", run.run_id, released);
        }
        if cancelled {
            self.approval.cancel_run(&run.run_id).await;
        }

        let terminal = if cancelled {
            ExecutionPhase::Cancelled
        } else {
            ExecutionPhase::Completed
        };
        run.force(terminal).await;

        if let Some(binding) = &run.checkpoint {
            binding.store.lock().await.seal_current();
        }

        let outcome = RunOutcome {
            run_id: run.run_id.clone(),
            phase: run.phases.kind(),
            response: run.response.take(),
            caveat: run.caveat,
            error: error.filter(|e| !e.is_cancelled()).map(|e| e.to_string()),
            iterations: run.iterations,
            usage: run.usage,
            goal_satisfied: run.goal_satisfied && !cancelled,
            checklist: run.checklist.items().to_vec(),
            profile: run.profile.active(),
            summarizations: run.window.summarization_count(),
        };
        info!(
            "[orchestrator] run {} finished: {} after {} step(s)",
            outcome.run_id, outcome.phase, outcome.iterations
        );
        run.events
            .emit(EngineEvent::RunFinished {
                outcome: outcome.clone(),
            })
            .await;
        outcome
    }
}

fn count_terminal(items: &[TaskChecklistItem]) -> usize {
    items.iter().filter(|i| i.status.is_terminal()).count()
}
