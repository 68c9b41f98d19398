//! Context Budget
//!
//! Limits derived from the effective context window. Derived limits scale
//! with the window but stay inside fixed bounds so tiny and huge models
//! both get workable values.

use stepwise_llm::{chars_for_tokens, context_limit, estimate_tokens};

use crate::models::settings::EngineConfig;

const OUTPUT_CAPTURE_MIN: u32 = 1_000;
const OUTPUT_CAPTURE_MAX: u32 = 16_000;
const AGENT_MEMORY_MIN: u32 = 4_000;
const AGENT_MEMORY_MAX: u32 = 64_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBudget {
    model: String,
    override_limit: Option<u32>,
}

impl ContextBudget {
    pub fn new(model: impl Into<String>, override_limit: Option<u32>) -> Self {
        Self {
            model: model.into(),
            override_limit,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.model.clone(), config.context_limit_override)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The user override when set, otherwise the model's window.
    pub fn effective_limit(&self) -> u32 {
        self.override_limit
            .unwrap_or_else(|| context_limit(&self.model))
    }

    /// Token budget for a single captured command/tool output.
    pub fn output_capture_limit(&self) -> u32 {
        (self.effective_limit() / 16).clamp(OUTPUT_CAPTURE_MIN, OUTPUT_CAPTURE_MAX)
    }

    /// Token budget for the summarized context log.
    pub fn agent_memory_limit(&self) -> u32 {
        (self.effective_limit() / 4).clamp(AGENT_MEMORY_MIN, AGENT_MEMORY_MAX)
    }

    /// Characters that fit in `output_capture_limit` for this model.
    pub fn output_capture_chars(&self) -> usize {
        chars_for_tokens(self.output_capture_limit(), &self.model)
    }

    /// Tokens at which summarization kicks in for the given ratio.
    pub fn threshold_tokens(&self, ratio: f64) -> u32 {
        (self.effective_limit() as f64 * ratio).floor() as u32
    }

    pub fn estimate(&self, text: &str) -> u32 {
        estimate_tokens(text, &self.model)
    }
}
