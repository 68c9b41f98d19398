//! Approval Gate
//!
//! Human sign-off for file-mutating tool calls. The engine builds an
//! [`ApprovalRequest`] with the proposed diff, hands it to an
//! [`ApprovalGate`] and parks the run in `WaitingForApproval` until a
//! decision arrives. Timeouts and cancellation are applied by the caller;
//! a timed-out wait counts as a rejection.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use similar::{DiffOp, DiffTag, TextDiff};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use stepwise_tools::{FileOperation, DIFF_CONTEXT_RADIUS};

use crate::services::events::{EngineEvent, EventBus};

/// A pending file change awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub run_id: String,
    pub tool_name: String,
    pub path: String,
    pub operation: FileOperation,
    /// One-line description for list views
    pub summary: String,
    /// Unified diff of the proposed change; empty when unknown
    pub proposed_diff: String,
    /// Number of independently decidable hunks in `proposed_diff`
    pub hunk_count: usize,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkDecision {
    pub index: usize,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Accept some hunks, or substitute edited content outright.
    Partial {
        #[serde(default)]
        hunks: Vec<HunkDecision>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        modified_content: Option<String>,
    },
}

impl ApprovalDecision {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ApprovalDecision::Rejected {
            reason: Some(reason.into()),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApprovalDecision::Rejected { .. })
    }
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Present `request` and wait for the decision.
    ///
    /// Implementations that involve a human announce the request on `events`.
    async fn request(&self, request: ApprovalRequest, events: &EventBus) -> ApprovalDecision;

    /// Abandon one pending request, e.g. after a timeout.
    async fn cancel_request(&self, _request_id: &str) {}

    /// Abandon every pending request of a run.
    async fn cancel_run(&self, _run_id: &str) {}
}

/// Approves everything without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request(&self, _request: ApprovalRequest, _events: &EventBus) -> ApprovalDecision {
        ApprovalDecision::Approved
    }
}

/// Rejects everything, with a fixed reason.
#[derive(Debug, Clone)]
pub struct RejectAll {
    reason: String,
}

impl RejectAll {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ApprovalGate for RejectAll {
    async fn request(&self, _request: ApprovalRequest, _events: &EventBus) -> ApprovalDecision {
        ApprovalDecision::rejected(self.reason.clone())
    }
}

struct PendingApproval {
    run_id: String,
    request: ApprovalRequest,
    tx: oneshot::Sender<ApprovalDecision>,
}

/// Gate resolved out-of-band by a presentation layer.
///
/// `request` registers a oneshot sender, emits `ApprovalRequested` and
/// waits; the UI answers through [`ChannelApprovalGate::resolve`]. A
/// dropped sender (run cancelled) reads as a rejection.
#[derive(Default)]
pub struct ChannelApprovalGate {
    pending: Mutex<HashMap<String, PendingApproval>>,
}

impl ChannelApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a decision. Returns false for unknown or already-settled ids.
    pub async fn resolve(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let entry = self.pending.lock().await.remove(request_id);
        match entry {
            Some(p) => p.tx.send(decision).is_ok(),
            None => false,
        }
    }

    pub async fn pending_requests(&self) -> Vec<ApprovalRequest> {
        self.pending
            .lock()
            .await
            .values()
            .map(|p| p.request.clone())
            .collect()
    }
}

#[async_trait]
impl ApprovalGate for ChannelApprovalGate {
    async fn request(&self, request: ApprovalRequest, events: &EventBus) -> ApprovalDecision {
        let request_id = request.request_id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            request_id.clone(),
            PendingApproval {
                run_id: request.run_id.clone(),
                request: request.clone(),
                tx,
            },
        );

        events.emit(EngineEvent::ApprovalRequested { request }).await;

        match rx.await {
            Ok(decision) => decision,
            Err(_) => {
                // Cleared by cancel_run or the gate was dropped.
                self.pending.lock().await.remove(&request_id);
                ApprovalDecision::rejected("approval request was cancelled")
            }
        }
    }

    async fn cancel_request(&self, request_id: &str) {
        if self.pending.lock().await.remove(request_id).is_some() {
            debug!("[approval] dropped pending request {}", request_id);
        }
    }

    async fn cancel_run(&self, run_id: &str) {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, p| p.run_id != run_id);
        debug!(
            "[approval] dropped {} pending request(s) for run {}",
            before - pending.len(),
            run_id
        );
    }
}

// ============================================================================
// Hunk handling
// ============================================================================

/// Hunks of `before -> after` grouped exactly as `unified_diff` shows them.
fn display_hunks(diff: &TextDiff<'_, '_, '_, str>) -> Vec<Vec<DiffOp>> {
    diff.unified_diff()
        .context_radius(DIFF_CONTEXT_RADIUS)
        .iter_hunks()
        .map(|hunk| hunk.ops().to_vec())
        .collect()
}

/// Number of `@@` hunks the approver sees for `before -> after`.
pub fn count_hunks(before: &str, after: &str) -> usize {
    display_hunks(&TextDiff::from_lines(before, after)).len()
}

/// Rebuild the file keeping only the accepted hunks of `before -> after`.
///
/// Hunks are numbered from 0 in file order, matching the `@@` sections of
/// the rendered diff. Hunks absent from `accepted` are rejected.
pub fn apply_hunk_decisions(before: &str, after: &str, accepted: &[HunkDecision]) -> String {
    let diff = TextDiff::from_lines(before, after);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();
    let is_accepted = |index: usize| accepted.iter().any(|h| h.index == index && h.accepted);

    let mut out = String::with_capacity(after.len().max(before.len()));
    let mut cursor = 0;
    for (index, ops) in display_hunks(&diff).iter().enumerate() {
        let take_new = is_accepted(index);
        for op in ops {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            for line in &old_lines[cursor..old_range.start] {
                out.push_str(line);
            }
            let source = if tag != DiffTag::Equal && take_new {
                &new_lines[new_range]
            } else {
                &old_lines[old_range.clone()]
            };
            for line in source {
                out.push_str(line);
            }
            cursor = old_range.end;
        }
    }
    for line in &old_lines[cursor..] {
        out.push_str(line);
    }
    out
}
