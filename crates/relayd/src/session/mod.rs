//! Terminal sessions using the actor pattern.
//!
//! Each session is an actor task that owns one tmux session running the
//! assistant. Handles talk to it over an mpsc mailbox; it publishes
//! [`SessionEvent`]s on a broadcast channel.
//!
//! ```text
//! ┌───────────────┐  SessionCommand   ┌──────────────┐  SessionEvent   ┌─────────────┐
//! │ SessionHandle │──────────────────▶│ SessionActor │────────────────▶│  broadcast  │
//! └───────────────┘   (mpsc)          └──────┬───────┘                 └─────────────┘
//!                                            │ ▲
//!                         Multiplexer calls  │ │ LivenessTick / DelayedCapture
//!                                            ▼ │ (timer tasks, weak sender)
//!                                     ┌──────────────┐
//!                                     │     tmux     │
//!                                     └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;
use std::time::Duration;

use relay_core::{DiffMode, SessionId};
use relay_tmux::Multiplexer;
use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::SessionActor;
pub use commands::{CaptureKind, SessionCommand, SessionError, SessionEvent};
pub use handle::SessionHandle;

/// Everything a session actor needs besides its multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Full tmux session name
    pub tmux_name: String,
    /// Command launched in the tmux session
    pub command: String,
    pub capture_delay: Duration,
    pub liveness_interval: Duration,
    pub scrollback_lines: Option<u32>,
    pub diff_mode: DiffMode,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

/// Spawns a session actor and returns a handle to it.
///
/// The session starts stopped; call [`SessionHandle::start`].
pub fn spawn_session(
    id: SessionId,
    mux: Arc<dyn Multiplexer>,
    settings: SessionSettings,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(settings.command_buffer.max(1));
    let (event_tx, _) = broadcast::channel(settings.event_buffer.max(1));

    let actor = SessionActor::new(
        id.clone(),
        cmd_rx,
        cmd_tx.downgrade(),
        event_tx.clone(),
        mux,
        settings,
    );
    tokio::spawn(actor.run());

    SessionHandle::new(id, cmd_tx, event_tx)
}
