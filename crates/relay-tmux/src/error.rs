use thiserror::Error;

/// Errors that can occur during tmux operations.
#[derive(Debug, Error)]
pub enum TmuxError {
    /// The tmux binary could not be executed
    #[error("failed to run {binary}: {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// tmux ran but exited unsuccessfully
    #[error("tmux {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Empty or otherwise unusable session name
    #[error("invalid tmux target: {0:?}")]
    InvalidTarget(String),
}
