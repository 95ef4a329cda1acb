//! Canonical conversation model.
//!
//! Every inbound shape (history record or live delta) is normalized into
//! a [`CanonicalMessage`]. The variant enum guarantees exactly one kind
//! of payload per message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolUseId;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One entry of the reconciled conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Source record id, when the feed supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

/// Payload variants of a canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Human {
        text: String,
    },
    Assistant {
        text: String,
    },
    System {
        text: String,
    },
    ToolUse {
        id: ToolUseId,
        name: String,
        input: Value,
        /// Merged in place once the matching result arrives
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ToolResultPayload>,
        loading: bool,
    },
    ToolResult(ToolResultPayload),
    Context(ContextStats),
    Session(SessionInfo),
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<ToolUseId>,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
    /// Structured result metadata (agent totals and the like)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Context window usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
}

/// Conversation session metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
}

impl CanonicalMessage {
    /// Creates a message stamped with the current time.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            timestamp: now_millis(),
            uuid: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: Option<String>) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Human { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant { text: text.into() })
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System { text: text.into() })
    }

    pub fn tool_use(id: ToolUseId, name: impl Into<String>, input: Value) -> Self {
        Self::new(MessageKind::ToolUse {
            id,
            name: name.into(),
            input,
            result: None,
            loading: true,
        })
    }

    pub fn tool_result(payload: ToolResultPayload) -> Self {
        Self::new(MessageKind::ToolResult(payload))
    }

    /// Id of the tool call, for `tool_use` messages.
    pub fn tool_use_id(&self) -> Option<&ToolUseId> {
        match &self.kind {
            MessageKind::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Id of the originating call, for `tool_result` messages.
    pub fn result_for(&self) -> Option<&ToolUseId> {
        match &self.kind {
            MessageKind::ToolResult(payload) => payload.tool_use_id.as_ref(),
            _ => None,
        }
    }

    /// True for a `tool_use` that already carries its result.
    pub fn is_resolved(&self) -> bool {
        matches!(&self.kind, MessageKind::ToolUse { result: Some(_), .. })
    }

    /// Attaches a result to a `tool_use`, clearing its loading flag.
    ///
    /// Returns `false` (and changes nothing) for any other variant.
    pub fn merge_result(&mut self, payload: ToolResultPayload) -> bool {
        match &mut self.kind {
            MessageKind::ToolUse {
                result, loading, ..
            } => {
                *result = Some(payload);
                *loading = false;
                true
            }
            _ => false,
        }
    }

    /// Short label of the variant, used in logs.
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            MessageKind::Human { .. } => "human",
            MessageKind::Assistant { .. } => "assistant",
            MessageKind::System { .. } => "system",
            MessageKind::ToolUse { .. } => "tool_use",
            MessageKind::ToolResult(_) => "tool_result",
            MessageKind::Context(_) => "context",
            MessageKind::Session(_) => "session",
        }
    }
}
