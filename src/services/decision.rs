//! Decision Prompts
//!
//! One-shot JSON classification calls (reflection, stuck checks,
//! verification overrides, profile selection). These are the only LLM
//! calls that are retried: empty, malformed or failed replies are retried
//! with linear backoff, then the last reply is used as-is. Callers treat
//! absent fields as "no signal".

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use stepwise_llm::LlmProvider;

use crate::models::settings::EngineConfig;
use crate::utils::error::{EngineError, EngineResult};

/// Parsed reply of a decision prompt. `fields` is empty when nothing parsed.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub raw: String,
    pub fields: Map<String, Value>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        }
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\n?(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Pull the first JSON object out of a reply that may carry prose or fences.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str(trimmed) {
        return Some(map);
    }
    if let Some(caps) = fence_regex().and_then(|re| re.captures(trimmed)) {
        if let Ok(Value::Object(map)) = serde_json::from_str(&caps[1]) {
            return Some(map);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[derive(Clone)]
pub struct DecisionClient {
    provider: Arc<dyn LlmProvider>,
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

impl DecisionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            max_attempts: config.decision_max_attempts.max(1),
            backoff: Duration::from_millis(config.decision_backoff_ms),
            timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    /// Ask and parse, retrying unusable replies.
    ///
    /// Errors only on cancellation; exhausted retries yield the last reply
    /// (possibly with no fields).
    pub async fn ask(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<Decision> {
        let mut last_raw = String::new();
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let call = tokio::time::timeout(self.timeout, self.provider.complete_text(system, user));
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                r = call => r,
            };
            match outcome {
                Ok(Ok(raw)) => {
                    if let Some(fields) = extract_json_object(&raw) {
                        return Ok(Decision { raw, fields });
                    }
                    debug!(
                        "[decision] attempt {}/{} returned no JSON object",
                        attempt, self.max_attempts
                    );
                    last_raw = raw;
                }
                Ok(Err(e)) => {
                    warn!("[decision] attempt {}/{} failed: {}", attempt, self.max_attempts, e)
                }
                Err(_) => warn!(
                    "[decision] attempt {}/{} timed out after {}s",
                    attempt,
                    self.max_attempts,
                    self.timeout.as_secs()
                ),
            }
            if attempt < self.max_attempts {
                let delay = self.backoff * attempt;
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        Ok(Decision {
            raw: last_raw,
            fields: Map::new(),
        })
    }
}
