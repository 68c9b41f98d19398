//! Engine Events
//!
//! Lifecycle notifications for whatever presentation layer is attached.
//! The engine never depends on a subscriber existing: a missing or closed
//! receiver is silently ignored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use stepwise_core::streaming::UnifiedStreamEvent;

use crate::models::checklist::TaskChecklistItem;
use crate::models::outcome::RunOutcome;
use crate::models::phase::ExecutionPhase;
use crate::models::profile::Profile;
use crate::services::approval::ApprovalRequest;

/// Status of one tool call as it moves through dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Succeeded,
    Failed,
    /// Refused by the human approval gate
    Rejected,
    /// Not permitted in the current agent mode
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PhaseChanged {
        run_id: String,
        phase: ExecutionPhase,
    },
    ToolStatus {
        run_id: String,
        tool_call_id: String,
        tool_name: String,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ApprovalRequested {
        request: ApprovalRequest,
    },
    ChecklistUpdated {
        run_id: String,
        items: Vec<TaskChecklistItem>,
        progress_percent: u8,
    },
    ProfileSwitched {
        run_id: String,
        from: Profile,
        to: Profile,
        reason: String,
    },
    ContextSummarized {
        run_id: String,
        tokens_before: u32,
        tokens_after: u32,
        summarization_count: u32,
    },
    FeedbackAccepted {
        run_id: String,
        text: String,
    },
    /// User-visible notice (stuck warnings, strategy changes)
    Notice {
        run_id: String,
        message: String,
    },
    /// Raw LLM stream event, forwarded when streaming is enabled
    Stream {
        run_id: String,
        event: UnifiedStreamEvent,
    },
    RunFinished {
        outcome: RunOutcome,
    },
}

/// Fire-and-forget sender for [`EngineEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<mpsc::Sender<EngineEvent>>,
}

impl EventBus {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Bus with no subscriber.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Bus plus the receiving end, with the given buffer size.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }
}
