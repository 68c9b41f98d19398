//! Unified Stream Event Types
//!
//! Provider-agnostic events emitted while an LLM response streams in. LLM
//! client adapters convert their wire format into these; the engine forwards
//! them to observers without interpreting provider details.

use serde::{Deserialize, Serialize};

/// Incremental event from a streaming LLM call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// Start of a tool call
    ToolStart { tool_id: String, tool_name: String },

    /// Partial JSON arguments for an in-flight tool call
    ToolArgumentDelta { tool_id: String, delta: String },

    /// Tool call complete with accumulated arguments
    ToolComplete {
        tool_id: String,
        tool_name: String,
        /// Complete JSON string of tool arguments
        arguments: String,
    },

    /// Token usage information
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },

    /// Error during streaming
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl UnifiedStreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_serialization() {
        let event = UnifiedStreamEvent::TextDelta {
            content: "hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text_delta\""));
        assert!(json.contains("\"content\":\"hello\""));
    }

    #[test]
    fn test_tool_argument_delta_round_trip() {
        let json = r#"{"type":"tool_argument_delta","tool_id":"t1","delta":"{\"pa"}"#;
        let event: UnifiedStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            UnifiedStreamEvent::ToolArgumentDelta {
                tool_id: "t1".to_string(),
                delta: "{\"pa".to_string(),
            }
        );
    }

    #[test]
    fn test_complete_omits_missing_stop_reason() {
        let event = UnifiedStreamEvent::Complete { stop_reason: None };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"complete"}"#);
        assert!(event.is_terminal());
    }

    #[test]
    fn test_usage_is_not_terminal() {
        let event = UnifiedStreamEvent::Usage {
            input_tokens: 10,
            output_tokens: 2,
        };
        assert!(!event.is_terminal());
    }
}
