//! Tool execution records.

use crate::agent::{AgentType, AGENT_TOOL_NAME};
use crate::TokenCount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Maximum characters of an agent prompt used as its description.
pub const DESCRIPTION_PROMPT_CHARS: usize = 60;

/// Unique identifier for a tool invocation.
///
/// Format: "toolu_..." (e.g., "toolu_01ABC123XYZ")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolUseId(String);

impl ToolUseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolUseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ToolUseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ToolUseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    /// Terminal status for a completion.
    pub fn finished(has_error: bool) -> Self {
        if has_error {
            Self::Error
        } else {
            Self::Completed
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One tool (or agent) invocation as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub id: ToolUseId,
    pub name: String,
    pub status: ToolStatus,
    pub started_at: DateTime<Utc>,
    /// Set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub is_agent: bool,
    /// Only present when `is_agent`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested invocations attributed to this agent
    pub tool_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<TokenCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent: Option<ToolUseId>,
}

impl ToolExecution {
    /// Creates a running execution, classifying `Task` calls that carry
    /// a `subagent_type` as agents.
    pub fn start(id: ToolUseId, name: &str, input: &Value, parent: Option<ToolUseId>) -> Self {
        let subagent_type = input.get("subagent_type").and_then(Value::as_str);
        let agent_type = match subagent_type {
            Some(kind) if name == AGENT_TOOL_NAME => Some(AgentType::from_subagent_type(kind)),
            _ => None,
        };
        let is_agent = agent_type.is_some();

        let description = input
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                if is_agent {
                    input
                        .get("prompt")
                        .and_then(Value::as_str)
                        .map(|p| truncate_chars(p, DESCRIPTION_PROMPT_CHARS))
                } else {
                    None
                }
            });

        Self {
            id,
            name: name.to_string(),
            status: ToolStatus::Running,
            started_at: Utc::now(),
            duration_ms: None,
            is_agent,
            agent_type,
            description,
            tool_count: 0,
            token_count: None,
            parent_agent: parent,
        }
    }

    /// Minimal stand-in for a completion whose start was never seen.
    pub fn placeholder(id: ToolUseId, has_error: bool) -> Self {
        Self {
            id,
            name: "unknown".to_string(),
            status: ToolStatus::finished(has_error),
            started_at: Utc::now(),
            duration_ms: Some(0),
            is_agent: false,
            agent_type: None,
            description: None,
            tool_count: 0,
            token_count: None,
            parent_agent: None,
        }
    }

    /// Marks the execution finished, computing duration from the start time.
    pub fn finish(&mut self, has_error: bool, now: DateTime<Utc>) {
        self.status = ToolStatus::finished(has_error);
        let elapsed = now.signed_duration_since(self.started_at).num_milliseconds();
        self.duration_ms = Some(u64::try_from(elapsed).unwrap_or(0));
    }
}

/// Completion payload of a tool invocation.
///
/// Agents report their totals either as explicit numeric fields or only
/// inside the textual content ("12 tool uses · 2.3k tokens").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutcome {
    pub content: Option<String>,
    pub total_tool_use_count: Option<u64>,
    pub total_tokens: Option<u64>,
    pub total_duration_ms: Option<u64>,
}

impl ToolOutcome {
    /// Reads an outcome from a JSON result object.
    ///
    /// `content` may be a string or an array of `{type: "text", text}` blocks.
    pub fn from_value(value: &Value) -> Self {
        Self {
            content: value.get("content").and_then(flatten_text),
            total_tool_use_count: value.get("totalToolUseCount").and_then(Value::as_u64),
            total_tokens: value.get("totalTokens").and_then(Value::as_u64),
            total_duration_ms: value.get("totalDurationMs").and_then(Value::as_u64),
        }
    }

    /// Outcome carrying only textual content.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// Flattens a string or an array of text blocks into one string.
///
/// Returns `None` when no text is present.
pub fn flatten_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}
