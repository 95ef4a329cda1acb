//! Outbound events published by the coordinator.

use relay_core::{CanonicalMessage, SessionId, TrackerSnapshot};
use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Event payloads, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// New cleaned terminal output
    OutputFiltered {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_percent: Option<u8>,
    },

    /// Context remaining until auto-compact
    ContextUpdated { context_percent: u8 },

    /// Running flag changed
    StatusChanged { is_running: bool },

    /// Displayed conversation after reconciliation
    MessagesUpdated { messages: Vec<CanonicalMessage> },

    /// Tool and agent bookkeeping after reconciliation
    ToolsUpdated { tools: TrackerSnapshot },
}

impl OutboundEvent {
    /// Wire name of the variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OutputFiltered { .. } => "output-filtered",
            Self::ContextUpdated { .. } => "context-updated",
            Self::StatusChanged { .. } => "status-changed",
            Self::MessagesUpdated { .. } => "messages-updated",
            Self::ToolsUpdated { .. } => "tools-updated",
        }
    }
}

/// Event stamped with the originating instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub protocol_version: ProtocolVersion,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: OutboundEvent,
}

impl OutboundMessage {
    /// Creates a message with the current protocol version.
    pub fn new(session_id: SessionId, event: OutboundEvent) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            session_id,
            event,
        }
    }

    /// Serializes to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
