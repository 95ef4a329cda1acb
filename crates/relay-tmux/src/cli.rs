//! [`Multiplexer`] implementation that shells out to the tmux CLI.
//!
//! Session targets use tmux's `=name` exact-match syntax so `relay-a`
//! never resolves to `relay-ab`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{Multiplexer, TmuxConfig, TmuxError};

/// tmux driven through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TmuxCli {
    config: TmuxConfig,
}

impl TmuxCli {
    pub fn new(config: TmuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TmuxConfig {
        &self.config
    }

    /// Returns `true` if the configured binary runs (`tmux -V`).
    pub async fn is_available(&self) -> bool {
        Command::new(&self.config.binary)
            .arg("-V")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Runs tmux and returns stdout.
    async fn run(&self, args: &[String]) -> Result<String, TmuxError> {
        let command = args.first().cloned().unwrap_or_default();
        trace!(binary = %self.config.binary, ?args, "Running tmux");

        let output = Command::new(&self.config.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| TmuxError::SpawnFailed {
                binary: self.config.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TmuxError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Multiplexer for TmuxCli {
    async fn create_detached_session(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<(), TmuxError> {
        let args = new_session_args(name, cwd, command)?;
        self.run(&args).await?;
        debug!(session = name, cwd = %cwd.display(), "Created tmux session");
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), TmuxError> {
        let target = session_target(name)?;
        self.run(&strings(&["kill-session", "-t", &target])).await?;
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool, TmuxError> {
        let target = session_target(name)?;
        match self.run(&strings(&["has-session", "-t", &target])).await {
            Ok(_) => Ok(true),
            Err(TmuxError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn send_keys(&self, name: &str, text: &str, with_enter: bool) -> Result<(), TmuxError> {
        for args in send_keys_args(name, text, with_enter)? {
            self.run(&args).await?;
        }
        Ok(())
    }

    async fn send_interrupt(&self, name: &str) -> Result<(), TmuxError> {
        let target = pane_target(name)?;
        self.run(&strings(&["send-keys", "-t", &target, "C-c"])).await?;
        Ok(())
    }

    async fn capture_pane(&self, name: &str, scrollback: Option<u32>) -> Result<String, TmuxError> {
        let args = capture_args(name, scrollback)?;
        self.run(&args).await
    }
}

// ============================================================================
// Argument construction
// ============================================================================

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}

fn session_target(name: &str) -> Result<String, TmuxError> {
    if name.trim().is_empty() {
        return Err(TmuxError::InvalidTarget(name.to_string()));
    }
    Ok(format!("={name}"))
}

/// Active pane of the named session.
fn pane_target(name: &str) -> Result<String, TmuxError> {
    Ok(format!("{}:", session_target(name)?))
}

fn new_session_args(name: &str, cwd: &Path, command: &str) -> Result<Vec<String>, TmuxError> {
    if name.trim().is_empty() {
        return Err(TmuxError::InvalidTarget(name.to_string()));
    }
    let mut args = strings(&["new-session", "-d", "-s", name, "-c"]);
    args.push(cwd.display().to_string());
    if !command.trim().is_empty() {
        args.push(command.to_string());
    }
    Ok(args)
}

/// Literal text first, then `Enter` as a separate key.
fn send_keys_args(name: &str, text: &str, with_enter: bool) -> Result<Vec<Vec<String>>, TmuxError> {
    let target = pane_target(name)?;
    let mut calls = vec![strings(&["send-keys", "-t", &target, "-l", "--", text])];
    if with_enter {
        calls.push(strings(&["send-keys", "-t", &target, "Enter"]));
    }
    Ok(calls)
}

fn capture_args(name: &str, scrollback: Option<u32>) -> Result<Vec<String>, TmuxError> {
    let target = pane_target(name)?;
    let mut args = strings(&["capture-pane", "-p", "-t", &target]);
    if let Some(lines) = scrollback {
        args.push("-S".to_string());
        args.push(format!("-{lines}"));
    }
    Ok(args)
}

// ============================================================================
// Tests
// ============================================================================
