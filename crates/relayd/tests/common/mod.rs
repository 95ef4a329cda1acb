//! Shared test helpers: an in-memory multiplexer.
//!
//! Each fake tmux session is a growing list of screen lines. Sending a line
//! echoes it as `> text` and appends any canned response registered for it,
//! so captures grow the way a real pane does.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{DiffMode, SessionId};
use relay_tmux::{Multiplexer, TmuxError};
use relayd::{RelayConfig, SessionSettings};

pub const WELCOME_SCREEN: &str = "\
✻ Welcome to Claude Code!
╭────────────────────────────╮
│ >                          │
╰────────────────────────────╯";

pub const LS_RESPONSE: &str = "\
⏺ Bash(ls)
  ⎿  Cargo.toml
     src
╭────────────────────────────╮
│ >                          │
╰────────────────────────────╯
  Context left until auto-compact: 42%";

#[derive(Debug, Default)]
struct FakeState {
    /// tmux session name -> screen lines
    sessions: HashMap<String, Vec<String>>,
    responses: HashMap<String, String>,
    sent: Vec<(String, String, bool)>,
    interrupts: Vec<String>,
    kills: Vec<String>,
    created: Vec<(String, String, String)>,
    liveness_checks: usize,
    fail_create: bool,
    fail_send: bool,
}

#[derive(Debug, Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeState>,
}

impl FakeMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Screen lines appended after `input` is sent.
    pub fn respond_to(&self, input: &str, response: &str) {
        self.state()
            .responses
            .insert(input.to_string(), response.to_string());
    }

    /// Simulates the assistant exiting on its own.
    pub fn vanish(&self, name: &str) {
        self.state().sessions.remove(name);
    }

    /// Simulates a session left over from an earlier run.
    pub fn leave_stale(&self, name: &str) {
        self.state()
            .sessions
            .insert(name.to_string(), vec!["stale".to_string()]);
    }

    pub fn fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state().fail_send = fail;
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.state().sessions.contains_key(name)
    }

    pub fn sent(&self) -> Vec<(String, String, bool)> {
        self.state().sent.clone()
    }

    pub fn interrupts(&self) -> Vec<String> {
        self.state().interrupts.clone()
    }

    pub fn kills(&self) -> Vec<String> {
        self.state().kills.clone()
    }

    pub fn created(&self) -> Vec<(String, String, String)> {
        self.state().created.clone()
    }

    /// Number of `has_session` calls so far.
    pub fn liveness_checks(&self) -> usize {
        self.state().liveness_checks
    }
}

fn missing(name: &str) -> TmuxError {
    TmuxError::CommandFailed {
        command: "fake".to_string(),
        stderr: format!("can't find session: {name}"),
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn create_detached_session(
        &self,
        name: &str,
        cwd: &Path,
        command: &str,
    ) -> Result<(), TmuxError> {
        let mut state = self.state();
        if state.fail_create || state.sessions.contains_key(name) {
            return Err(TmuxError::CommandFailed {
                command: "new-session".to_string(),
                stderr: format!("duplicate session: {name}"),
            });
        }
        state.sessions.insert(
            name.to_string(),
            WELCOME_SCREEN.lines().map(str::to_string).collect(),
        );
        state.created.push((
            name.to_string(),
            cwd.display().to_string(),
            command.to_string(),
        ));
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), TmuxError> {
        let mut state = self.state();
        state.kills.push(name.to_string());
        state.sessions.remove(name).map(|_| ()).ok_or_else(|| missing(name))
    }

    async fn has_session(&self, name: &str) -> Result<bool, TmuxError> {
        let mut state = self.state();
        state.liveness_checks += 1;
        Ok(state.sessions.contains_key(name))
    }

    async fn send_keys(&self, name: &str, text: &str, with_enter: bool) -> Result<(), TmuxError> {
        let mut state = self.state();
        if state.fail_send {
            return Err(missing(name));
        }
        let response = state.responses.get(text).cloned();
        let screen = state.sessions.get_mut(name).ok_or_else(|| missing(name))?;
        if with_enter {
            screen.push(format!("> {text}"));
            if let Some(response) = response {
                screen.extend(response.lines().map(str::to_string));
            }
        }
        state
            .sent
            .push((name.to_string(), text.to_string(), with_enter));
        Ok(())
    }

    async fn send_interrupt(&self, name: &str) -> Result<(), TmuxError> {
        let mut state = self.state();
        if !state.sessions.contains_key(name) {
            return Err(missing(name));
        }
        state.interrupts.push(name.to_string());
        Ok(())
    }

    async fn capture_pane(&self, name: &str, _scrollback: Option<u32>) -> Result<String, TmuxError> {
        self.state()
            .sessions
            .get(name)
            .map(|lines| lines.join("\n"))
            .ok_or_else(|| missing(name))
    }
}

/// Default settings for an instance, with small channel buffers.
pub fn settings(id: &str) -> SessionSettings {
    let mut settings = RelayConfig::default().session_settings(&SessionId::new(id));
    settings.command_buffer = 16;
    settings.event_buffer = 16;
    settings.diff_mode = DiffMode::LineCount;
    settings
}

pub const CAPTURE_DELAY: Duration = Duration::from_secs(3);
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);
