//! Engine Configuration
//!
//! Every field has a serde default so a partial TOML file (or none at all)
//! yields a usable config. `validate()` rejects values the engine cannot
//! run with; `EngineConfigBuilder::build()` and `EngineConfig::load()`
//! always validate.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stepwise_tools::AgentMode;

use crate::models::profile::ProfileSelection;
use crate::utils::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model name used for token estimation and the context limit table.
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the model's context window when set.
    #[serde(default)]
    pub context_limit_override: Option<u32>,
    /// Outer step cap; 0 means unlimited.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// LLM rounds allowed within a single step.
    #[serde(default = "default_max_tool_loops")]
    pub max_tool_loops: u32,
    #[serde(default = "default_true")]
    pub reflection_enabled: bool,
    #[serde(default = "default_reflection_interval")]
    pub reflection_interval: u32,
    #[serde(default = "default_stuck_window")]
    pub stuck_window: usize,
    #[serde(default = "default_stuck_similarity")]
    pub stuck_similarity_threshold: f64,
    /// Fraction of the effective limit that triggers summarization.
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: f64,
    /// Log entries kept verbatim when summarizing (clamped to 10..=15).
    #[serde(default = "default_recent_entries")]
    pub recent_entries_preserved: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// `None` waits for the human indefinitely.
    #[serde(default)]
    pub approval_timeout_secs: Option<u64>,
    #[serde(default = "default_decision_attempts")]
    pub decision_max_attempts: u32,
    /// Linear backoff step between decision retries.
    #[serde(default = "default_decision_backoff_ms")]
    pub decision_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub require_file_approval: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub agent_mode: AgentMode,
    #[serde(default)]
    pub profile: ProfileSelection,
    /// Re-run profile selection whenever a new checklist item starts.
    #[serde(default = "default_true")]
    pub auto_profile_on_task_start: bool,
    /// Reject illegal phase transitions instead of forcing them.
    #[serde(default)]
    pub strict_transitions: bool,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_iterations() -> u32 {
    40
}

fn default_max_tool_loops() -> u32 {
    25
}

fn default_true() -> bool {
    true
}

fn default_reflection_interval() -> u32 {
    5
}

fn default_stuck_window() -> usize {
    3
}

fn default_stuck_similarity() -> f64 {
    0.7
}

fn default_summarize_threshold() -> f64 {
    0.95
}

fn default_recent_entries() -> usize {
    12
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_decision_attempts() -> u32 {
    3
}

fn default_decision_backoff_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            context_limit_override: None,
            max_iterations: default_max_iterations(),
            max_tool_loops: default_max_tool_loops(),
            reflection_enabled: true,
            reflection_interval: default_reflection_interval(),
            stuck_window: default_stuck_window(),
            stuck_similarity_threshold: default_stuck_similarity(),
            summarize_threshold: default_summarize_threshold(),
            recent_entries_preserved: default_recent_entries(),
            llm_timeout_secs: default_llm_timeout_secs(),
            approval_timeout_secs: None,
            decision_max_attempts: default_decision_attempts(),
            decision_backoff_ms: default_decision_backoff_ms(),
            require_file_approval: true,
            streaming: false,
            agent_mode: AgentMode::default(),
            profile: ProfileSelection::default(),
            auto_profile_on_task_start: true,
            strict_transitions: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.model.trim().is_empty() {
            return Err(EngineError::config("model must not be empty"));
        }
        if self.max_tool_loops == 0 {
            return Err(EngineError::config("max_tool_loops must be at least 1"));
        }
        if self.reflection_enabled && self.reflection_interval == 0 {
            return Err(EngineError::config(
                "reflection_interval must be at least 1 when reflection is enabled",
            ));
        }
        if self.stuck_window < 2 {
            return Err(EngineError::config("stuck_window must be at least 2"));
        }
        if !(0.0..=1.0).contains(&self.stuck_similarity_threshold) {
            return Err(EngineError::config(
                "stuck_similarity_threshold must be within [0, 1]",
            ));
        }
        if !(self.summarize_threshold > 0.0 && self.summarize_threshold <= 1.0) {
            return Err(EngineError::config("summarize_threshold must be in (0, 1]"));
        }
        if self.decision_max_attempts == 0 {
            return Err(EngineError::config("decision_max_attempts must be at least 1"));
        }
        if self.llm_timeout_secs == 0 {
            return Err(EngineError::config("llm_timeout_secs must be at least 1"));
        }
        if let Some(limit) = self.context_limit_override {
            if limit < 1_000 {
                return Err(EngineError::config(
                    "context_limit_override must be at least 1000 tokens",
                ));
            }
        }
        Ok(())
    }

    /// Preserved entry count clamped into the supported 10..=15 window.
    pub fn recent_entries(&self) -> usize {
        self.recent_entries_preserved.clamp(10, 15)
    }
}

// ============================================================================
// EngineConfigBuilder
// ============================================================================

/// Builder for [`EngineConfig`]; `build()` validates.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn context_limit_override(mut self, limit: u32) -> Self {
        self.config.context_limit_override = Some(limit);
        self
    }

    pub fn max_iterations(mut self, n: u32) -> Self {
        self.config.max_iterations = n;
        self
    }

    pub fn max_tool_loops(mut self, n: u32) -> Self {
        self.config.max_tool_loops = n;
        self
    }

    pub fn reflection(mut self, enabled: bool, interval: u32) -> Self {
        self.config.reflection_enabled = enabled;
        self.config.reflection_interval = interval;
        self
    }

    pub fn stuck_detection(mut self, window: usize, threshold: f64) -> Self {
        self.config.stuck_window = window;
        self.config.stuck_similarity_threshold = threshold;
        self
    }

    pub fn summarize_threshold(mut self, ratio: f64) -> Self {
        self.config.summarize_threshold = ratio;
        self
    }

    pub fn recent_entries_preserved(mut self, n: usize) -> Self {
        self.config.recent_entries_preserved = n;
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs;
        self
    }

    pub fn approval_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.approval_timeout_secs = secs;
        self
    }

    pub fn decision_retries(mut self, attempts: u32, backoff_ms: u64) -> Self {
        self.config.decision_max_attempts = attempts;
        self.config.decision_backoff_ms = backoff_ms;
        self
    }

    pub fn require_file_approval(mut self, required: bool) -> Self {
        self.config.require_file_approval = required;
        self
    }

    pub fn streaming(mut self, enabled: bool) -> Self {
        self.config.streaming = enabled;
        self
    }

    pub fn agent_mode(mut self, mode: AgentMode) -> Self {
        self.config.agent_mode = mode;
        self
    }

    pub fn profile(mut self, selection: ProfileSelection) -> Self {
        self.config.profile = selection;
        self
    }

    pub fn auto_profile_on_task_start(mut self, enabled: bool) -> Self {
        self.config.auto_profile_on_task_start = enabled;
        self
    }

    pub fn strict_transitions(mut self, strict: bool) -> Self {
        self.config.strict_transitions = strict;
        self
    }

    pub fn build(self) -> EngineResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::Profile;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 40);
        assert_eq!(config.max_tool_loops, 25);
        assert!((config.stuck_similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.summarize_threshold - 0.95).abs() < f64::EPSILON);
        assert!(config.approval_timeout_secs.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            model = "claude-sonnet-4"
            max_iterations = 0
            agent_mode = "planning"
            profile = "debugging"
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "claude-sonnet-4");
        assert_eq!(config.max_iterations, 0);
        assert_eq!(config.agent_mode, AgentMode::Planning);
        assert_eq!(config.profile, ProfileSelection::Fixed(Profile::Debugging));
        assert_eq!(config.reflection_interval, 5);
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        let err = EngineConfig::from_toml_str("max_tool_loops = 0").unwrap_err();
        assert!(err.to_string().contains("max_tool_loops"));

        let err = EngineConfig::from_toml_str("summarize_threshold = 1.5").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_toml_str("profile = \"poetry\"").unwrap_err();
        assert!(matches!(err, EngineError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stuck_window = 4\nrequire_file_approval = false").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.stuck_window, 4);
        assert!(!config.require_file_approval);
    }

    #[test]
    fn test_builder_validates() {
        let config = EngineConfigBuilder::new()
            .model("gpt-4o")
            .context_limit_override(32_000)
            .max_tool_loops(5)
            .build()
            .unwrap();
        assert_eq!(config.context_limit_override, Some(32_000));

        assert!(EngineConfigBuilder::new().stuck_detection(1, 0.7).build().is_err());
        assert!(EngineConfigBuilder::new().context_limit_override(10).build().is_err());
    }

    #[test]
    fn test_recent_entries_clamped() {
        let mut config = EngineConfig::default();
        config.recent_entries_preserved = 3;
        assert_eq!(config.recent_entries(), 10);
        config.recent_entries_preserved = 40;
        assert_eq!(config.recent_entries(), 15);
    }
}
