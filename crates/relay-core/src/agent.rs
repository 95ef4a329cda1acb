//! Sub-agent classification for `Task` tool invocations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the tool Claude Code uses to spawn sub-agents.
pub const AGENT_TOOL_NAME: &str = "Task";

/// Kind of sub-agent spawned through the `Task` tool, taken from the
/// `subagent_type` field of the tool input.
///
/// Serialized as its canonical name (`"explore"`, `"plan"`, ...); an
/// unrecognized name round-trips unchanged as [`AgentType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    #[default]
    GeneralPurpose,
    Explore,
    Plan,
    CodeReviewer,
    StatuslineSetup,
    Custom(String),
}

impl AgentType {
    /// Parses a `subagent_type` value. Matching ignores case and accepts
    /// both `-` and `_` separators.
    pub fn from_subagent_type(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "general-purpose" => Self::GeneralPurpose,
            "explore" | "explorer" => Self::Explore,
            "plan" | "planner" => Self::Plan,
            "code-reviewer" | "codereview" => Self::CodeReviewer,
            "statusline-setup" => Self::StatuslineSetup,
            _ => Self::Custom(raw.to_string()),
        }
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::GeneralPurpose => "general-purpose",
            Self::Explore => "explore",
            Self::Plan => "plan",
            Self::CodeReviewer => "code-reviewer",
            Self::StatuslineSetup => "statusline-setup",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for AgentType {
    fn from(raw: String) -> Self {
        Self::from_subagent_type(&raw)
    }
}

impl From<AgentType> for String {
    fn from(agent: AgentType) -> Self {
        agent.as_str().to_string()
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
