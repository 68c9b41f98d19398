//! Behavioral Profiles
//!
//! A profile tunes the system prompt and the focus of periodic reflection.
//! The user either pins one (`ProfileSelection::Fixed`) or lets the engine
//! retarget it per task (`ProfileSelection::Auto`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    General,
    Coding,
    Testing,
    Debugging,
    Refactoring,
    Documentation,
    #[serde(rename = "devops")]
    DevOps,
}

impl Profile {
    pub const ALL: [Profile; 7] = [
        Profile::General,
        Profile::Coding,
        Profile::Testing,
        Profile::Debugging,
        Profile::Refactoring,
        Profile::Documentation,
        Profile::DevOps,
    ];

    /// Short identifier used in prompts, logs and events.
    pub fn id(&self) -> &'static str {
        match self {
            Profile::General => "general",
            Profile::Coding => "coding",
            Profile::Testing => "testing",
            Profile::Debugging => "debugging",
            Profile::Refactoring => "refactoring",
            Profile::Documentation => "documentation",
            Profile::DevOps => "devops",
        }
    }

    pub fn from_id(id: &str) -> Option<Profile> {
        let id = id.trim().to_lowercase();
        Profile::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Appended to the system prompt while this profile is active.
    pub fn prompt_addition(&self) -> &'static str {
        match self {
            Profile::General => "Work methodically and explain what you change.",
            Profile::Coding => {
                "Focus on correct, idiomatic implementation. Read surrounding code before editing and keep changes minimal."
            }
            Profile::Testing => {
                "Focus on tests. Run the test suite after changes and treat failing tests as the primary signal."
            }
            Profile::Debugging => {
                "Focus on finding root causes. Reproduce the failure, form a hypothesis, verify it, then fix."
            }
            Profile::Refactoring => {
                "Preserve behavior. Change structure in small steps and run tests between steps."
            }
            Profile::Documentation => {
                "Focus on clear, accurate documentation that matches the code as it is."
            }
            Profile::DevOps => {
                "Focus on build, deployment and environment configuration. Prefer idempotent commands."
            }
        }
    }

    /// What periodic reflection should check for under this profile.
    pub fn reflection_focus(&self) -> &'static str {
        match self {
            Profile::General => "overall progress toward the goal",
            Profile::Coding => "whether the implementation compiles and matches the task",
            Profile::Testing => "whether tests pass and cover the change",
            Profile::Debugging => "whether the root cause has been identified",
            Profile::Refactoring => "whether behavior is preserved",
            Profile::Documentation => "whether the docs are accurate and complete",
            Profile::DevOps => "whether the environment is in the intended state",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// User-facing selection: a pinned profile or automatic retargeting.
///
/// Serialized as a bare string: `"auto"` or a profile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProfileSelection {
    #[default]
    Auto,
    Fixed(Profile),
}

impl ProfileSelection {
    pub fn is_auto(&self) -> bool {
        matches!(self, ProfileSelection::Auto)
    }

    /// Profile a run starts with.
    pub fn initial_profile(&self) -> Profile {
        match self {
            ProfileSelection::Auto => Profile::General,
            ProfileSelection::Fixed(p) => *p,
        }
    }
}

impl TryFrom<String> for ProfileSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("auto") {
            return Ok(ProfileSelection::Auto);
        }
        Profile::from_id(&value)
            .map(ProfileSelection::Fixed)
            .ok_or_else(|| format!("unknown profile '{}'", value))
    }
}

impl From<ProfileSelection> for String {
    fn from(value: ProfileSelection) -> String {
        match value {
            ProfileSelection::Auto => "auto".to_string(),
            ProfileSelection::Fixed(p) => p.id().to_string(),
        }
    }
}

/// Confidence reported by the classification prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(raw: &str) -> Option<Confidence> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" | "med" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}
