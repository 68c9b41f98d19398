//! Core Error Types
//!
//! Foundational errors shared by every Stepwise crate. Only `thiserror`,
//! `serde_json` and std are needed here; the engine crate layers its own
//! `EngineError` on top and converts from `CoreError`.

use thiserror::Error;

/// Core error type for the Stepwise workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A tool argument or request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity (tool, checkpoint, request) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed model output or payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// The surrounding run was cancelled while waiting
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = CoreError::config("max_tool_loops must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: max_tool_loops must be positive"
        );
    }

    #[test]
    fn test_error_into_string() {
        let err = CoreError::not_found("checkpoint cp-1");
        let msg: String = err.into();
        assert_eq!(msg, "Not found: checkpoint cp-1");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert!(!core_err.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_flagged() {
        let err = CoreError::cancelled("approval wait");
        assert!(err.is_cancelled());
        assert!(err.to_string().starts_with("Cancelled"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let core_err: CoreError = parse_err.into();
        assert!(matches!(core_err, CoreError::Serialization(_)));
    }
}
