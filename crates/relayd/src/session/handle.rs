//! Client interface for a [`SessionActor`](super::SessionActor).
//!
//! # Panic-Free Guarantees
//!
//! Channel errors are mapped to `SessionError::ChannelClosed`.

use std::path::PathBuf;

use relay_core::{SessionId, SessionStatus};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{SessionCommand, SessionError, SessionEvent};

/// Cheap-to-clone handle to one terminal session.
///
/// Dropping every handle closes the actor's mailbox and ends the actor.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    sender: mpsc::Sender<SessionCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        sender: mpsc::Sender<SessionCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            sender,
            event_sender,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Starts the assistant in `cwd`.
    ///
    /// `Ok(false)` when already running or tmux refused.
    pub async fn start(&self, cwd: impl Into<PathBuf>) -> Result<bool, SessionError> {
        let cwd = cwd.into();
        self.request(|respond_to| SessionCommand::Start { cwd, respond_to })
            .await
    }

    /// Types `text` followed by Enter.
    ///
    /// `Ok(false)` when not running or tmux refused.
    pub async fn send(&self, text: impl Into<String>) -> Result<bool, SessionError> {
        let text = text.into();
        self.request(|respond_to| SessionCommand::Send { text, respond_to })
            .await
    }

    pub async fn interrupt(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionCommand::Interrupt { respond_to })
            .await
    }

    pub async fn stop(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionCommand::Stop { respond_to })
            .await
    }

    pub async fn raw_output(&self) -> Result<String, SessionError> {
        self.request(|respond_to| SessionCommand::RawOutput { respond_to })
            .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|respond_to| SessionCommand::Status { respond_to })
            .await
    }

    /// Subscribes to this session's events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }
}
