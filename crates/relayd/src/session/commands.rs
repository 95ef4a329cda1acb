//! Session actor commands, errors, and events.
//!
//! - `SessionCommand`: requests from handles plus the actor's own timer ticks
//! - `SessionError`: failures talking to the actor
//! - `SessionEvent`: what the session publishes to subscribers

use std::path::PathBuf;

use relay_core::SessionStatus;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Session Commands
// ============================================================================

/// Commands processed by a [`SessionActor`](super::SessionActor).
///
/// Requests carry a oneshot `respond_to`. Timer messages are posted by the
/// actor's own background tasks and carry the generation they were
/// scheduled under.
#[derive(Debug)]
pub enum SessionCommand {
    /// Launch the assistant in a fresh tmux session.
    Start {
        cwd: PathBuf,
        respond_to: oneshot::Sender<bool>,
    },

    /// Type a line of input and schedule a capture.
    Send {
        text: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Send Ctrl-C.
    Interrupt { respond_to: oneshot::Sender<bool> },

    /// Kill the tmux session.
    Stop { respond_to: oneshot::Sender<bool> },

    /// Full capture of the pane, empty when stopped.
    RawOutput { respond_to: oneshot::Sender<String> },

    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },

    /// Periodic liveness probe.
    LivenessTick { generation: u64 },

    /// Capture scheduled after a start or send.
    DelayedCapture { generation: u64, kind: CaptureKind },
}

/// What a delayed capture is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// First capture after start; filters the whole pane.
    Initial,
    /// Capture after a send; filters only the new region.
    Incremental,
}

// ============================================================================
// Session Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The actor has shut down or dropped the reply.
    #[error("session channel closed")]
    ChannelClosed,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published by a session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Cleaned output from a capture.
    OutputFiltered {
        content: String,
        context_percent: Option<u8>,
    },

    /// Context remaining until auto-compact.
    ContextUpdated { context_percent: u8 },

    /// Running flag changed.
    StatusChanged { is_running: bool },
}
