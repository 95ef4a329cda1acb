//! Relay Tmux - terminal multiplexer control surface
//!
//! [`Multiplexer`] is the seam between session management and tmux.
//! [`TmuxCli`] implements it by running the `tmux` binary; tests substitute
//! their own implementation.
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()` or `panic!()` outside tests. Command failures
//! are returned as [`TmuxError`].

mod cli;
mod config;
mod error;

use std::path::Path;

use async_trait::async_trait;

pub use cli::TmuxCli;
pub use config::TmuxConfig;
pub use error::TmuxError;

/// Operations relay needs from a terminal multiplexer.
///
/// `name` is always the full multiplexer session name.
#[async_trait]
pub trait Multiplexer: Send + Sync + 'static {
    /// Starts `command` in a new detached session rooted at `cwd`.
    async fn create_detached_session(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<(), TmuxError>;

    async fn kill_session(&self, name: &str) -> Result<(), TmuxError>;

    /// `Ok(false)` when the session does not exist.
    async fn has_session(&self, name: &str) -> Result<bool, TmuxError>;

    /// Types `text` literally, optionally followed by Enter.
    async fn send_keys(&self, name: &str, text: &str, with_enter: bool) -> Result<(), TmuxError>;

    /// Sends the Ctrl-C key.
    async fn send_interrupt(&self, name: &str) -> Result<(), TmuxError>;

    /// Visible pane text, plus `scrollback` history lines when given.
    async fn capture_pane(&self, name: &str, scrollback: Option<u32>) -> Result<String, TmuxError>;
}
