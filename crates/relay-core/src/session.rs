//! Session identifiers and run status.

use crate::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of one logical assistant instance.
///
/// The same identifier names the tmux session the instance runs in
/// (after the configured prefix is applied), so it must be a valid
/// tmux target: non-empty, no whitespace, no `:` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new SessionId from a string without validation.
    ///
    /// Use [`SessionId::parse`] for identifiers coming from outside
    /// the process.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses and validates an identifier.
    pub fn parse(id: &str) -> DomainResult<Self> {
        let valid = !id.is_empty()
            && !id
                .chars()
                .any(|c| c.is_whitespace() || c == ':' || c == '.');
        if !valid {
            return Err(DomainError::InvalidFieldValue {
                field: "session id".to_string(),
                value: id.to_string(),
                expected: "non-empty, without whitespace, ':' or '.'".to_string(),
            });
        }
        Ok(Self(id.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tmux session name for this instance.
    #[must_use]
    pub fn tmux_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Run Status
// ============================================================================

/// Snapshot of a terminal session's run state.
///
/// `pid` is a presence indicator only. tmux does not hand back the
/// assistant's real process id through the control surface we use,
/// so consumers must rely on `is_running` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl SessionStatus {
    /// Status of a session with no external process.
    pub const STOPPED: SessionStatus = SessionStatus {
        is_running: false,
        pid: None,
    };

    /// Status of a running session. The stand-in pid is the generation
    /// counter of the session's current run.
    pub fn running(generation: u64) -> Self {
        Self {
            is_running: true,
            pid: u32::try_from(generation).ok(),
        }
    }

    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.is_running {
            "running"
        } else {
            "stopped"
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_parse_accepts_plain_names() {
        let id = SessionId::parse("backend-1").unwrap();
        assert_eq!(id.as_str(), "backend-1");
    }

    #[test]
    fn test_session_id_parse_rejects_tmux_separators() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("a b").is_err());
        assert!(SessionId::parse("win:1").is_err());
        assert!(SessionId::parse("pane.2").is_err());
    }

    #[test]
    fn test_tmux_name_applies_prefix() {
        let id = SessionId::new("docs");
        assert_eq!(id.tmux_name("relay-"), "relay-docs");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::STOPPED.label(), "stopped");
        let running = SessionStatus::running(3);
        assert!(running.is_running);
        assert_eq!(running.pid, Some(3));
        assert_eq!(format!("{running}"), "running");
    }
}
