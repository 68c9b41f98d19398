//! Context Window Manager
//!
//! Owns a run's context log and keeps it inside the token budget. Every
//! entry is clipped on append; before each LLM call the orchestrator asks
//! `needs_summarization` and, when it returns true, condenses everything
//! but the most recent entries into a single summary entry.

use chrono::{DateTime, Utc};
use tracing::info;

use stepwise_llm::chars_for_tokens;

use crate::services::context::budget::ContextBudget;
use crate::services::context::compaction::ContextCompactor;
use crate::services::context::truncation::{hard_truncate, truncate_output};
use crate::utils::error::EngineResult;

pub const SUMMARY_HEADER: &str = "[SUMMARIZED HISTORY]";
pub const RECENT_HEADER: &str = "[RECENT ACTIVITY]";

/// Share of the threshold under which a log is left alone.
const UNCHANGED_RATIO: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeOutcome {
    Unchanged,
    Summarized {
        text: String,
        tokens_before: u32,
        tokens_after: u32,
    },
}

/// Condense `entries` when they exceed 95% of `threshold_tokens`.
///
/// The newest `recent_keep` entries are kept verbatim; the rest go through
/// `compactor`. The result is clipped to `max_tokens`.
pub async fn summarize_log(
    entries: &[String],
    max_tokens: u32,
    threshold_tokens: u32,
    recent_keep: usize,
    model: &str,
    compactor: &dyn ContextCompactor,
) -> EngineResult<SummarizeOutcome> {
    let tokens_before = log_tokens(entries, model);
    if tokens_before as f64 <= threshold_tokens as f64 * UNCHANGED_RATIO {
        return Ok(SummarizeOutcome::Unchanged);
    }

    let split = entries.len().saturating_sub(recent_keep);
    let (older, recent) = entries.split_at(split);
    let recent_text = recent.join("\n");

    // Summary gets whatever the recent block leaves, but never less than a quarter.
    let recent_tokens = stepwise_llm::estimate_tokens(&recent_text, model);
    let summary_target = max_tokens
        .saturating_sub(recent_tokens)
        .max(max_tokens / 4)
        .max(1);

    let summary = if older.is_empty() {
        "(no earlier activity)".to_string()
    } else {
        compactor.summarize(older, summary_target).await?
    };

    let text = format!(
        "{}\n{}\n\n{}\n{}",
        SUMMARY_HEADER, summary, RECENT_HEADER, recent_text
    );
    let text = hard_truncate(&text, chars_for_tokens(max_tokens, model));
    let tokens_after = stepwise_llm::estimate_tokens(&text, model);
    Ok(SummarizeOutcome::Summarized {
        text,
        tokens_before,
        tokens_after,
    })
}

fn log_tokens(entries: &[String], model: &str) -> u32 {
    entries
        .iter()
        .map(|e| stepwise_llm::estimate_tokens(e, model))
        .fold(0u32, |acc, t| acc.saturating_add(t))
}

/// What one summarization did, for events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryReport {
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub summarization_count: u32,
}

#[derive(Debug, Clone)]
pub struct ContextWindowManager {
    budget: ContextBudget,
    threshold_ratio: f64,
    recent_keep: usize,
    entries: Vec<String>,
    accumulated_context_tokens: u32,
    summarization_count: u32,
    last_summarized_at: Option<DateTime<Utc>>,
}

impl ContextWindowManager {
    pub fn new(budget: ContextBudget, threshold_ratio: f64, recent_keep: usize) -> Self {
        Self {
            budget,
            threshold_ratio,
            recent_keep,
            entries: Vec::new(),
            accumulated_context_tokens: 0,
            summarization_count: 0,
            last_summarized_at: None,
        }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Append one entry, clipped to the output capture limit.
    pub fn append(&mut self, entry: impl AsRef<str>) {
        let clipped = truncate_output(entry.as_ref(), self.budget.output_capture_chars());
        let tokens = self.budget.estimate(&clipped);
        self.accumulated_context_tokens = self.accumulated_context_tokens.saturating_add(tokens);
        self.entries.push(clipped);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn render(&self) -> String {
        self.entries.join("\n")
    }

    pub fn log_tokens(&self) -> u32 {
        log_tokens(&self.entries, self.budget.model())
    }

    /// Tokens appended since the last summarization.
    pub fn accumulated_context_tokens(&self) -> u32 {
        self.accumulated_context_tokens
    }

    pub fn summarization_count(&self) -> u32 {
        self.summarization_count
    }

    pub fn last_summarized_at(&self) -> Option<DateTime<Utc>> {
        self.last_summarized_at
    }

    pub fn threshold_tokens(&self) -> u32 {
        self.budget.threshold_tokens(self.threshold_ratio)
    }

    /// Log plus `prompt_tokens` would cross the summarization threshold.
    pub fn needs_summarization(&self, prompt_tokens: u32) -> bool {
        self.log_tokens().saturating_add(prompt_tokens) > self.threshold_tokens()
    }

    /// Condense the log so that it and `prompt_tokens` fit again.
    ///
    /// Always resets the accumulated high-water mark and stamps the time.
    pub async fn summarize(
        &mut self,
        prompt_tokens: u32,
        compactor: &dyn ContextCompactor,
    ) -> EngineResult<Option<SummaryReport>> {
        let log_threshold = self
            .threshold_tokens()
            .saturating_sub(prompt_tokens)
            .max(1);
        let max_tokens = self.budget.agent_memory_limit().min(log_threshold / 2).max(1);

        let outcome = summarize_log(
            &self.entries,
            max_tokens,
            log_threshold,
            self.recent_keep,
            self.budget.model(),
            compactor,
        )
        .await?;

        self.accumulated_context_tokens = 0;
        self.last_summarized_at = Some(Utc::now());

        match outcome {
            SummarizeOutcome::Unchanged => Ok(None),
            SummarizeOutcome::Summarized {
                text,
                tokens_before,
                tokens_after,
            } => {
                self.entries = vec![text];
                self.summarization_count += 1;
                info!(
                    "[context] summarized log with {}: {} -> {} tokens (#{})",
                    compactor.name(),
                    tokens_before,
                    tokens_after,
                    self.summarization_count
                );
                Ok(Some(SummaryReport {
                    tokens_before,
                    tokens_after,
                    summarization_count: self.summarization_count,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::context::compaction::ExtractiveCompactor;

    fn manager() -> ContextWindowManager {
        ContextWindowManager::new(ContextBudget::new("gpt-4o", Some(32_000)), 0.95, 12)
    }

    fn big_entry(i: usize) -> String {
        // 7_600 chars = 1_900 tokens, under the 2_000 token capture limit
        format!("entry {:03} {}", i, "y".repeat(7_590))
    }

    #[tokio::test]
    async fn test_small_log_is_unchanged() {
        let entries = vec!["a".to_string(), "b".to_string()];
        let outcome = summarize_log(&entries, 1_000, 1_000, 12, "gpt-4o", &ExtractiveCompactor::new("gpt-4o"))
            .await
            .unwrap();
        assert_eq!(outcome, SummarizeOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_summary_shape_and_idempotence() {
        let entries: Vec<String> = (0..40).map(|i| format!("step {} {}", i, "z".repeat(400))).collect();
        let compactor = ExtractiveCompactor::new("gpt-4o");
        let outcome = summarize_log(&entries, 2_000, 3_000, 10, "gpt-4o", &compactor)
            .await
            .unwrap();
        let SummarizeOutcome::Summarized { text, tokens_after, .. } = outcome else {
            panic!("expected a summary");
        };
        assert!(text.starts_with(SUMMARY_HEADER));
        assert!(text.contains(RECENT_HEADER));
        assert!(tokens_after <= 2_000);

        let again = summarize_log(&[text], 2_000, 3_000, 10, "gpt-4o", &compactor)
            .await
            .unwrap();
        assert_eq!(again, SummarizeOutcome::Unchanged);
    }

    #[test]
    fn test_append_clips_entries() {
        let mut m = manager();
        m.append("z".repeat(50_000));
        assert!(m.entries()[0].chars().count() <= m.budget().output_capture_chars());
        assert_eq!(m.accumulated_context_tokens(), m.log_tokens());
    }

    #[tokio::test]
    async fn test_threshold_crossing_resets_accumulated() {
        let mut m = manager();
        for i in 0..16 {
            m.append(big_entry(i));
        }
        // 16 * 1_900 = 30_400 tokens of log, right at 95% of 32_000.
        assert!(!m.needs_summarization(0));
        assert!(m.needs_summarization(10));
        assert!(m.accumulated_context_tokens() >= 30_400);

        let report = m
            .summarize(10, &ExtractiveCompactor::new("gpt-4o"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.accumulated_context_tokens(), 0);
        assert_eq!(m.summarization_count(), 1);
        assert!(m.last_summarized_at().is_some());
        assert_eq!(m.entries().len(), 1);
        assert!(report.tokens_after <= m.budget().agent_memory_limit());
        assert!(!m.needs_summarization(10));
    }
}
