//! LLM Provider Trait
//!
//! The single contract the engine uses to talk to a language model. Wire
//! formats, auth and HTTP live in adapters that implement this trait; the
//! engine only needs "complete text", "complete with tools" and its
//! streaming variant.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tokens;
use crate::types::{
    LlmRequestOptions, LlmResponse, LlmResult, Message, ToolDefinition,
};
use stepwise_core::streaming::UnifiedStreamEvent;

/// Trait that all LLM clients implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether this provider supports tool calling.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Returns the model's context window size in tokens.
    ///
    /// Defaults to the family table in [`tokens::context_limit`].
    fn context_window(&self) -> u32 {
        tokens::context_limit(self.model())
    }

    /// Send a conversation and get a complete response.
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Stream a response via a channel, returning the final assembled response.
    ///
    /// The default implementation performs a blocking `send_message` and replays
    /// the result as a burst of events, for adapters without native streaming.
    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let response = self
            .send_message(messages, system, tools, request_options)
            .await?;
        replay_as_events(&response, &tx).await;
        Ok(response)
    }

    /// One-shot text completion with no tools.
    async fn complete_text(&self, system: &str, user: &str) -> LlmResult<String> {
        let response = self
            .send_message(
                vec![Message::user(user)],
                Some(system.to_string()),
                Vec::new(),
                LlmRequestOptions::default(),
            )
            .await?;
        Ok(response.content.unwrap_or_default())
    }
}

/// Emit the stream events equivalent to an already-complete response.
pub async fn replay_as_events(response: &LlmResponse, tx: &mpsc::Sender<UnifiedStreamEvent>) {
    if let Some(text) = response.content.as_deref().filter(|t| !t.is_empty()) {
        let _ = tx
            .send(UnifiedStreamEvent::TextDelta {
                content: text.to_string(),
            })
            .await;
    }
    for call in &response.tool_calls {
        let arguments = call.arguments.to_string();
        let _ = tx
            .send(UnifiedStreamEvent::ToolStart {
                tool_id: call.id.clone(),
                tool_name: call.name.clone(),
            })
            .await;
        let _ = tx
            .send(UnifiedStreamEvent::ToolArgumentDelta {
                tool_id: call.id.clone(),
                delta: arguments.clone(),
            })
            .await;
        let _ = tx
            .send(UnifiedStreamEvent::ToolComplete {
                tool_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments,
            })
            .await;
    }
    let _ = tx
        .send(UnifiedStreamEvent::Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
        .await;
    let _ = tx
        .send(UnifiedStreamEvent::Complete {
            stop_reason: Some(response.stop_reason.to_string()),
        })
        .await;
}
