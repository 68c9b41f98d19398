//! Scripted Provider
//!
//! Deterministic `LlmProvider` for engine tests. Tool-enabled calls pop the
//! next scripted turn; one-shot `complete_text` calls are answered by an
//! optional responder closure, then by a queue of canned replies, then by
//! `"{}"` (no signal).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::LlmProvider;
use crate::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ToolCall, ToolDefinition,
};

type Responder = Box<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// One recorded tool-enabled request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

impl RecordedRequest {
    /// All message text joined, for content assertions.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.plain_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ScriptedProvider {
    model: String,
    turns: Mutex<VecDeque<LlmResult<LlmResponse>>>,
    decisions: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
    prompts: Mutex<Vec<(String, String)>>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            turns: Mutex::new(VecDeque::new()),
            decisions: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Queue a turn that requests the given tool calls.
    pub fn then_tools(self, calls: Vec<ToolCall>) -> Self {
        let response = LlmResponse::tools(self.model.clone(), calls).with_usage(100, 20);
        self.push_turn(Ok(response))
    }

    /// Queue a text-only turn.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        let response = LlmResponse::text(self.model.clone(), text).with_usage(100, 20);
        self.push_turn(Ok(response))
    }

    /// Queue a provider failure.
    pub fn then_error(self, error: LlmError) -> Self {
        self.push_turn(Err(error))
    }

    /// Queue a reply for the next one-shot `complete_text` call.
    pub fn then_decision(self, json: impl Into<String>) -> Self {
        self.decisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(json.into());
        self
    }

    /// Answer one-shot prompts by inspecting `(system, user)`.
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    /// Delay every tool-enabled call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push_turn(self, turn: LlmResult<LlmResponse>) -> Self {
        self.turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(turn);
        self
    }

    /// Requests seen by `send_message`, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `(system, user)` pairs seen by `complete_text`, in order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        _request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                system,
                messages,
                tool_names: tools.into_iter().map(|t| t.name).collect(),
            });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self
            .turns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        // An exhausted script ends the turn rather than failing the run.
        next.unwrap_or_else(|| Ok(LlmResponse::text(self.model.clone(), "Done.")))
    }

    async fn complete_text(&self, system: &str, user: &str) -> LlmResult<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system.to_string(), user.to_string()));
        if let Some(reply) = self.responder.as_ref().and_then(|f| f(system, user)) {
            return Ok(reply);
        }
        let queued = self
            .decisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(queued.unwrap_or_else(|| "{}".to_string()))
    }
}
