//! Error Handling
//!
//! Engine-level error type. Tool failures are never errors here: they are
//! `ToolResult` values fed back to the model. `EngineError` covers what
//! stops an operation outright (bad config, I/O outside tools, provider
//! failures surfaced to the caller, rejected phase transitions).

use stepwise_core::CoreError;
use stepwise_llm::LlmError;
use thiserror::Error;

use crate::models::phase::PhaseKind;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML config parse errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failures reported by the LLM client
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Rejected by the state machine in strict mode
    #[error("Illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: PhaseKind, to: PhaseKind },

    /// The run or wait was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine errors
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Core(core) => core.is_cancelled(),
            _ => false,
        }
    }
}

impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
