use serde::{Deserialize, Serialize};

/// How relay talks to tmux and what it runs inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxConfig {
    /// tmux executable (looked up on `PATH` unless absolute)
    pub binary: String,
    /// Shell command started in each new session
    pub command: String,
    /// Prepended to instance ids to form tmux session names
    pub session_prefix: String,
    /// History lines above the visible pane to include in captures
    pub scrollback_lines: Option<u32>,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
            command: "claude".to_string(),
            session_prefix: "relay-".to_string(),
            scrollback_lines: None,
        }
    }
}
