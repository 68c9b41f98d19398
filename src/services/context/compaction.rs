//! Log Compaction
//!
//! Pluggable strategies that condense the older part of the context log
//! into a bounded summary block.
//!
//! - `LlmSummaryCompactor` - one-shot LLM summary, degrading to the
//!   extractive digest when the call fails or returns nothing
//! - `ExtractiveCompactor` - deterministic digest that keeps error and
//!   finding lines first

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use stepwise_llm::{chars_for_tokens, LlmProvider};

use crate::services::context::truncation::{hard_truncate, is_signal_line};
use crate::utils::error::EngineResult;

const SUMMARY_SYSTEM_PROMPT: &str = "You condense the activity log of a coding agent. \
Keep file paths, commands, errors and decisions. Drop repeated output. \
Answer with plain text bullet points only.";

const FINDING_INDICATORS: &[&str] = &[
    "created",
    "modified",
    "deleted",
    "updated",
    "fixed",
    "implemented",
    "decided",
    "found",
    "confirmed",
    "[exit code:",
    "[feedback]",
    "[reflection]",
    "[strategy]",
    "[profile]",
];

#[async_trait]
pub trait ContextCompactor: Send + Sync {
    /// Condense `entries` into at most roughly `target_tokens` tokens.
    async fn summarize(&self, entries: &[String], target_tokens: u32) -> EngineResult<String>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// ExtractiveCompactor
// ============================================================================

/// Zero-cost digest of the log.
///
/// Error/warning lines come first, then lines that record a change or
/// decision, then the first line of every remaining entry, until the
/// budget runs out.
#[derive(Debug, Clone)]
pub struct ExtractiveCompactor {
    model: String,
}

impl ExtractiveCompactor {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn digest(&self, entries: &[String], target_tokens: u32) -> String {
        let budget = chars_for_tokens(target_tokens, &self.model);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut picked: Vec<&str> = Vec::new();

        let lines = || {
            entries
                .iter()
                .flat_map(|e| e.lines())
                .map(str::trim)
                .filter(|l| !l.is_empty())
        };

        for line in lines().filter(|l| is_signal_line(l)) {
            if seen.insert(line) {
                picked.push(line);
            }
        }
        for line in lines().filter(|l| {
            let lower = l.to_lowercase();
            FINDING_INDICATORS.iter().any(|ind| lower.contains(ind))
        }) {
            if seen.insert(line) {
                picked.push(line);
            }
        }
        for first in entries.iter().filter_map(|e| e.lines().map(str::trim).find(|l| !l.is_empty())) {
            if seen.insert(first) {
                picked.push(first);
            }
        }

        let mut out = format!("{} earlier log entries condensed:\n", entries.len());
        for line in picked {
            let bullet = format!("- {}\n", line);
            if out.chars().count() + bullet.chars().count() > budget {
                break;
            }
            out.push_str(&bullet);
        }
        hard_truncate(out.trim_end(), budget)
    }
}

#[async_trait]
impl ContextCompactor for ExtractiveCompactor {
    async fn summarize(&self, entries: &[String], target_tokens: u32) -> EngineResult<String> {
        Ok(self.digest(entries, target_tokens))
    }

    fn name(&self) -> &str {
        "ExtractiveCompactor"
    }
}

// ============================================================================
// LlmSummaryCompactor
// ============================================================================

pub struct LlmSummaryCompactor {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
    fallback: ExtractiveCompactor,
}

impl LlmSummaryCompactor {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        let fallback = ExtractiveCompactor::new(provider.model());
        Self {
            provider,
            timeout,
            fallback,
        }
    }
}

#[async_trait]
impl ContextCompactor for LlmSummaryCompactor {
    async fn summarize(&self, entries: &[String], target_tokens: u32) -> EngineResult<String> {
        let budget = chars_for_tokens(target_tokens, self.provider.model());
        // Feed the model at most four times the output budget.
        let joined = hard_truncate(&entries.join("\n---\n"), budget.saturating_mul(4));
        let user = format!(
            "Summarize this log in at most {} words.\n\n{}",
            (target_tokens * 3 / 4).max(50),
            joined
        );

        let reply = tokio::time::timeout(
            self.timeout,
            self.provider.complete_text(SUMMARY_SYSTEM_PROMPT, &user),
        )
        .await;

        match reply {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(hard_truncate(text.trim(), budget)),
            Ok(Ok(_)) => {
                warn!("[context] summary call returned nothing, using extractive digest");
                self.fallback.summarize(entries, target_tokens).await
            }
            Ok(Err(e)) => {
                warn!("[context] summary call failed ({}), using extractive digest", e);
                self.fallback.summarize(entries, target_tokens).await
            }
            Err(_) => {
                warn!(
                    "[context] summary call timed out after {}s, using extractive digest",
                    self.timeout.as_secs()
                );
                self.fallback.summarize(entries, target_tokens).await
            }
        }
    }

    fn name(&self) -> &str {
        "LlmSummaryCompactor"
    }
}
