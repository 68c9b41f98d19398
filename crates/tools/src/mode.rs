//! Agent Modes and Tool Capabilities
//!
//! Every tool declares one capability. The active agent mode decides which
//! capabilities may run; a call outside the mode is rejected locally and
//! never dispatched.

use serde::{Deserialize, Serialize};

/// What a tool does to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Reads files or directories
    Read,
    /// Creates, modifies or deletes files
    Write,
    /// Runs shell commands
    Execute,
    /// Talks to the network
    Network,
    /// Engine-internal planning/checklist updates
    Bookkeeping,
}

/// Operating mode of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Answer questions; inspect but never change anything
    Chat,
    /// Inspect and plan; may maintain the checklist
    Planning,
    /// Full autonomy
    #[default]
    Agent,
}

impl AgentMode {
    pub fn allows(&self, capability: ToolCapability) -> bool {
        match self {
            AgentMode::Chat => matches!(capability, ToolCapability::Read | ToolCapability::Network),
            AgentMode::Planning => matches!(
                capability,
                ToolCapability::Read | ToolCapability::Network | ToolCapability::Bookkeeping
            ),
            AgentMode::Agent => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Chat => "chat",
            AgentMode::Planning => "planning",
            AgentMode::Agent => "agent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_is_read_only() {
        assert!(AgentMode::Chat.allows(ToolCapability::Read));
        assert!(AgentMode::Chat.allows(ToolCapability::Network));
        assert!(!AgentMode::Chat.allows(ToolCapability::Write));
        assert!(!AgentMode::Chat.allows(ToolCapability::Execute));
        assert!(!AgentMode::Chat.allows(ToolCapability::Bookkeeping));
    }

    #[test]
    fn test_planning_mode_allows_bookkeeping_only() {
        assert!(AgentMode::Planning.allows(ToolCapability::Bookkeeping));
        assert!(!AgentMode::Planning.allows(ToolCapability::Write));
    }

    #[test]
    fn test_agent_mode_allows_everything() {
        for cap in [
            ToolCapability::Read,
            ToolCapability::Write,
            ToolCapability::Execute,
            ToolCapability::Network,
            ToolCapability::Bookkeeping,
        ] {
            assert!(AgentMode::Agent.allows(cap));
        }
    }

    #[test]
    fn test_mode_serde() {
        let mode: AgentMode = serde_json::from_str("\"planning\"").unwrap();
        assert_eq!(mode, AgentMode::Planning);
        assert_eq!(AgentMode::default(), AgentMode::Agent);
    }
}
