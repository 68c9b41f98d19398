//! Tool Dispatch
//!
//! One tool call from the model, end to end: bookkeeping short-circuit,
//! mode gate, approval, file lock, checkpoint snapshot, execution and the
//! context log entry. Tool failures come back as `ToolResult` values; the
//! only errors are cancellation and strict-mode transition rejections.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use stepwise_core::ToolContext;
use stepwise_llm::ToolCall;
use stepwise_tools::{
    unified_diff, FileChange, FileOperation, ProposedContent, Tool, ToolCapability, ToolResult,
};

use crate::models::phase::ExecutionPhase;
use crate::services::approval::{
    apply_hunk_decisions, count_hunks, ApprovalDecision, ApprovalRequest, HunkDecision,
};
use crate::services::context::truncate_output;
use crate::services::events::ToolStatus;
use crate::services::events::EngineEvent;
use crate::utils::error::{EngineError, EngineResult};

use super::bookkeeping;
use super::run::RunState;
use super::service::Orchestrator;

/// What the tool loop needs back from one dispatched call.
#[derive(Debug, Clone)]
pub(crate) struct Dispatched {
    pub result: ToolResult,
    /// Content sent back to the model, clipped to the capture budget
    pub content: String,
    /// Engine-handled checklist call
    pub bookkeeping: bool,
}

const ARGS_PREVIEW_CHARS: usize = 200;

fn args_preview(args: &Value) -> String {
    let raw = args.to_string();
    if raw.chars().count() <= ARGS_PREVIEW_CHARS {
        return raw;
    }
    let cut: String = raw.chars().take(ARGS_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

async fn read_existing(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

/// Diff, hunk count and operation shown to the approver.
fn describe_proposal(
    display_path: &str,
    before: Option<&str>,
    proposed: &ProposedContent,
) -> (String, usize, FileOperation) {
    let existing = before.unwrap_or("");
    let default_op = if before.is_none() {
        FileOperation::Create
    } else {
        FileOperation::Modify
    };
    match proposed {
        ProposedContent::Content(after) => (
            unified_diff(display_path, existing, after),
            count_hunks(existing, after),
            default_op,
        ),
        ProposedContent::Delete => (
            unified_diff(display_path, existing, ""),
            count_hunks(existing, ""),
            FileOperation::Delete,
        ),
        ProposedContent::Unknown => (String::new(), 0, default_op),
    }
}

/// Write the approver's partial selection in place of running the tool.
async fn write_partial(
    path: &Path,
    display_path: &str,
    before: Option<&str>,
    content: &str,
) -> ToolResult {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return ToolResult::err(format!("Failed to create {}: {}", parent.display(), e));
        }
    }
    match tokio::fs::write(path, content).await {
        Ok(()) => ToolResult::ok(format!(
            "Applied the approved part of the change to {}",
            display_path
        ))
        .with_file_change(FileChange::between(display_path, before, Some(content))),
        Err(e) => ToolResult::err(format!("Failed to write {}: {}", display_path, e)),
    }
}

impl Orchestrator {
    pub(crate) async fn dispatch(
        &self,
        run: &mut RunState,
        call: &ToolCall,
    ) -> EngineResult<Dispatched> {
        if bookkeeping::is_bookkeeping(&call.name) {
            return self.dispatch_bookkeeping(run, call).await;
        }

        let Some(tool) = self.registry.get(&call.name) else {
            warn!("[orchestrator] model called unknown tool {}", call.name);
            let result = ToolResult::err(format!("Unknown tool: {}", call.name));
            self.emit_status(run, call, ToolStatus::Failed, result.error.clone())
                .await;
            return Ok(self.finish_call(run, call, None, result));
        };

        let mode = self.config.agent_mode;
        if !mode.allows(tool.capability()) {
            debug!(
                "[orchestrator] {} is not available in {} mode",
                call.name,
                mode.as_str()
            );
            let result = ToolResult::err(format!(
                "Tool '{}' is not available in {} mode",
                call.name,
                mode.as_str()
            ));
            self.emit_status(run, call, ToolStatus::Unavailable, result.error.clone())
                .await;
            return Ok(self.finish_call(run, call, None, result));
        }

        let detail = tool.is_long_running().then(|| "long-running".to_string());
        self.emit_status(run, call, ToolStatus::Started, detail).await;

        let ctx = ToolContext::new(&self.session_id, &run.run_id, &self.working_dir)
            .with_tool_call_id(&call.id)
            .with_cancellation(run.cancel_token());

        let command = tool.command_text(&call.arguments);
        let result = match tool.mutation_target(&call.arguments) {
            Some(target) => {
                match self
                    .execute_mutation(run, call, tool.as_ref(), &ctx, &target)
                    .await?
                {
                    Some(result) => result,
                    None => {
                        let result = ToolResult::err(format!(
                            "The change to {} was rejected by the user",
                            target
                        ));
                        self.emit_status(run, call, ToolStatus::Rejected, result.error.clone())
                            .await;
                        return Ok(self.finish_call(run, call, None, result));
                    }
                }
            }
            None => tool.execute(&ctx, call.arguments.clone()).await,
        };

        if let Some(cmd) = &command {
            run.stuck.record(cmd);
            if let Some(binding) = &run.checkpoint {
                let mut store = binding.store.lock().await;
                if let Err(e) = store.record_shell_command(&binding.checkpoint_id, cmd) {
                    warn!("[checkpoint] could not record command: {}", e);
                }
            }
        }

        let status = if result.success {
            ToolStatus::Succeeded
        } else {
            ToolStatus::Failed
        };
        self.emit_status(run, call, status, result.error.clone()).await;
        Ok(self.finish_call(run, call, command.as_deref(), result))
    }

    async fn dispatch_bookkeeping(
        &self,
        run: &mut RunState,
        call: &ToolCall,
    ) -> EngineResult<Dispatched> {
        if !self.config.agent_mode.allows(ToolCapability::Bookkeeping) {
            let result = ToolResult::err(format!(
                "Tool '{}' is not available in {} mode",
                call.name,
                self.config.agent_mode.as_str()
            ));
            self.emit_status(run, call, ToolStatus::Unavailable, result.error.clone())
                .await;
            let content = result.to_content();
            return Ok(Dispatched {
                result,
                content,
                bookkeeping: true,
            });
        }

        let goal = run.goal.clone();
        let outcome = bookkeeping::apply(&mut run.checklist, &goal, call);
        if outcome.changed {
            debug!(
                "[orchestrator] checklist updated by {}: {}%",
                call.name,
                run.checklist.progress_percent()
            );
            self.advance_checklist(run).await?;
            run.emit_checklist().await;
        }
        let content = outcome.result.to_content();
        Ok(Dispatched {
            result: outcome.result,
            content,
            bookkeeping: true,
        })
    }

    /// Approval, lock and snapshot around a file-mutating call.
    ///
    /// `None` means the approver rejected the change.
    async fn execute_mutation(
        &self,
        run: &mut RunState,
        call: &ToolCall,
        tool: &dyn Tool,
        ctx: &ToolContext,
        target: &str,
    ) -> EngineResult<Option<ToolResult>> {
        let path = ctx.resolve_path(target);
        let before = read_existing(&path).await;
        let proposed = tool.propose(before.as_deref(), &call.arguments);

        let decision = if self.config.require_file_approval {
            let (proposed_diff, hunk_count, operation) =
                describe_proposal(target, before.as_deref(), &proposed);
            let request = ApprovalRequest {
                request_id: Uuid::new_v4().to_string(),
                run_id: run.run_id.clone(),
                tool_name: call.name.clone(),
                path: target.to_string(),
                operation,
                summary: format!("{} {} via {}", operation.as_str(), target, call.name),
                proposed_diff,
                hunk_count,
                arguments: call.arguments.clone(),
            };
            run.enter(ExecutionPhase::WaitingForApproval).await?;
            let decision = self.await_approval(run, request).await?;
            let resumed = run.executing();
            run.enter(resumed).await?;
            decision
        } else {
            ApprovalDecision::Approved
        };

        if let ApprovalDecision::Rejected { reason } = &decision {
            info!(
                "[orchestrator] change to {} rejected: {}",
                target,
                reason.as_deref().unwrap_or("no reason given")
            );
            return Ok(None);
        }

        let cancel = run.cancel_token();
        let _guard = match self.locks.try_acquire(&path, &run.run_id) {
            Some(guard) => guard,
            None => {
                run.enter(ExecutionPhase::WaitingForFileLock {
                    path: target.to_string(),
                })
                .await?;
                let guard = self.locks.acquire(&path, &run.run_id, &cancel).await?;
                let resumed = run.executing();
                run.enter(resumed).await?;
                guard
            }
        };

        // Re-read under the lock; another run may have written meanwhile.
        let before = read_existing(&path).await;
        if let Some(binding) = &run.checkpoint {
            let mut store = binding.store.lock().await;
            if let Err(e) = store.record_file_change(&binding.checkpoint_id, &path, before.clone()) {
                warn!("[checkpoint] could not snapshot {}: {}", path.display(), e);
            }
        }

        let result = match decision {
            ApprovalDecision::Partial {
                hunks,
                modified_content,
            } => {
                let content = partial_content(before.as_deref(), &proposed, &hunks, modified_content);
                match content {
                    Some(content) => write_partial(&path, target, before.as_deref(), &content).await,
                    None => tool.execute(ctx, call.arguments.clone()).await,
                }
            }
            _ => tool.execute(ctx, call.arguments.clone()).await,
        };
        Ok(Some(result))
    }

    async fn await_approval(
        &self,
        run: &RunState,
        request: ApprovalRequest,
    ) -> EngineResult<ApprovalDecision> {
        let request_id = request.request_id.clone();
        let cancel = run.cancel_token();
        let timeout = self.config.approval_timeout_secs.map(Duration::from_secs);

        let wait = self.approval.request(request, &run.events);
        let waited = tokio::select! {
            _ = cancel.cancelled() => None,
            decision = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                    None => Some(wait.await),
                }
            } => Some(decision),
        };

        match waited {
            None => {
                self.approval.cancel_request(&request_id).await;
                Err(EngineError::Cancelled)
            }
            Some(None) => {
                self.approval.cancel_request(&request_id).await;
                let secs = self.config.approval_timeout_secs.unwrap_or_default();
                warn!("[approval] request {} timed out after {}s", request_id, secs);
                Ok(ApprovalDecision::rejected(format!(
                    "no decision within {}s",
                    secs
                )))
            }
            Some(Some(_)) if run.is_cancelled() => Err(EngineError::Cancelled),
            Some(Some(decision)) => Ok(decision),
        }
    }

    async fn emit_status(
        &self,
        run: &RunState,
        call: &ToolCall,
        status: ToolStatus,
        detail: Option<String>,
    ) {
        run.events
            .emit(EngineEvent::ToolStatus {
                run_id: run.run_id.clone(),
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                status,
                detail,
            })
            .await;
    }

    /// Clip the result and append it to the context log.
    fn finish_call(
        &self,
        run: &mut RunState,
        call: &ToolCall,
        command: Option<&str>,
        result: ToolResult,
    ) -> Dispatched {
        let content = truncate_output(
            &result.to_content(),
            run.window.budget().output_capture_chars(),
        );
        let entry = match command {
            Some(cmd) => format!("$ {}\n{}", cmd, content),
            None => format!("{} {}\n{}", call.name, args_preview(&call.arguments), content),
        };
        run.window.append(entry);
        Dispatched {
            result,
            content,
            bookkeeping: false,
        }
    }
}

/// Content to write for a partial approval, or `None` to run the tool as is.
fn partial_content(
    before: Option<&str>,
    proposed: &ProposedContent,
    hunks: &[HunkDecision],
    modified_content: Option<String>,
) -> Option<String> {
    if modified_content.is_some() {
        return modified_content;
    }
    let existing = before.unwrap_or("");
    match proposed {
        ProposedContent::Content(after) => Some(apply_hunk_decisions(existing, after, hunks)),
        ProposedContent::Delete => Some(apply_hunk_decisions(existing, "", hunks)),
        ProposedContent::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_proposal_operations() {
        let (diff, hunks, op) = describe_proposal(
            "src/lib.rs",
            None,
            &ProposedContent::Content("fn health() {}\n".to_string()),
        );
        assert_eq!(op, FileOperation::Create);
        assert_eq!(hunks, 1);
        assert!(diff.contains("+fn health() {}"));

        let (_, _, op) = describe_proposal("a.txt", Some("x\n"), &ProposedContent::Delete);
        assert_eq!(op, FileOperation::Delete);

        let (diff, hunks, op) = describe_proposal("a.txt", Some("x\n"), &ProposedContent::Unknown);
        assert!(diff.is_empty());
        assert_eq!(hunks, 0);
        assert_eq!(op, FileOperation::Modify);
    }

    #[test]
    fn test_partial_content_prefers_edited_text() {
        let proposed = ProposedContent::Content("a\nB\n".to_string());
        assert_eq!(
            partial_content(Some("a\nb\n"), &proposed, &[], Some("mine\n".to_string())),
            Some("mine\n".to_string())
        );
        let rejected_all = partial_content(
            Some("a\nb\n"),
            &proposed,
            &[HunkDecision {
                index: 0,
                accepted: false,
            }],
            None,
        );
        assert_eq!(rejected_all, Some("a\nb\n".to_string()));
        assert!(partial_content(None, &ProposedContent::Unknown, &[], None).is_none());
    }

    #[test]
    fn test_args_preview_is_bounded() {
        let long = json!({"content": "x".repeat(1000)});
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= ARGS_PREVIEW_CHARS + 3);
        assert_eq!(args_preview(&json!({"path": "a"})), r#"{"path":"a"}"#);
    }
}
