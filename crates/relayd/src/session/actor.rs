//! Session actor - owns one tmux-hosted assistant and its last snapshot.
//!
//! All access to the session goes through the actor's mailbox: handle
//! requests, liveness ticks and delayed captures are processed one at a
//! time, so the read-diff-write of the snapshot is never interleaved.
//!
//! Timer tasks hold only a weak sender to the mailbox and exit once the
//! actor is gone. Every timer message carries the generation it was
//! scheduled under; a message from an earlier run, or one arriving after
//! `stop`, is discarded.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Multiplexer failures are logged and reported as `false`
//! - Event send failures (no subscribers) are ignored

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{filter_output, OutputDiffer, SessionId, SessionStatus};
use relay_tmux::Multiplexer;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::commands::{CaptureKind, SessionCommand, SessionEvent};
use super::SessionSettings;

/// `interval_at` panics on a zero period.
const MIN_LIVENESS_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Session Actor
// ============================================================================

/// The session actor - single owner of one terminal session's state.
pub struct SessionActor {
    id: SessionId,
    receiver: mpsc::Receiver<SessionCommand>,
    /// Handed to timer tasks
    mailbox: mpsc::WeakSender<SessionCommand>,
    event_publisher: broadcast::Sender<SessionEvent>,
    mux: Arc<dyn Multiplexer>,
    settings: SessionSettings,
    differ: OutputDiffer,

    is_running: bool,
    cwd: Option<PathBuf>,
    last_snapshot: String,
    /// Bumped on every successful start
    generation: u64,
    liveness: Option<CancellationToken>,
}

impl SessionActor {
    pub fn new(
        id: SessionId,
        receiver: mpsc::Receiver<SessionCommand>,
        mailbox: mpsc::WeakSender<SessionCommand>,
        event_publisher: broadcast::Sender<SessionEvent>,
        mux: Arc<dyn Multiplexer>,
        settings: SessionSettings,
    ) -> Self {
        let differ = OutputDiffer::new(settings.diff_mode);
        Self {
            id,
            receiver,
            mailbox,
            event_publisher,
            mux,
            settings,
            differ,
            is_running: false,
            cwd: None,
            last_snapshot: String::new(),
            generation: 0,
            liveness: None,
        }
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self) {
        debug!(session = %self.id, tmux = %self.settings.tmux_name, "Session actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        self.cancel_liveness();
        debug!(
            session = %self.id,
            running = self.is_running,
            "Session actor stopped"
        );
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Start { cwd, respond_to } => {
                let result = self.handle_start(cwd).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Send { text, respond_to } => {
                let result = self.handle_send(&text).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Interrupt { respond_to } => {
                let result = self.handle_interrupt().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Stop { respond_to } => {
                let result = self.handle_stop().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RawOutput { respond_to } => {
                let result = self.handle_raw_output().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            SessionCommand::LivenessTick { generation } => {
                self.handle_liveness_tick(generation).await;
            }
            SessionCommand::DelayedCapture { generation, kind } => {
                self.handle_delayed_capture(generation, kind).await;
            }
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    async fn handle_start(&mut self, cwd: PathBuf) -> bool {
        if self.is_running {
            warn!(session = %self.id, "Start requested while already running");
            return false;
        }

        let name = self.settings.tmux_name.clone();

        // A session left over from an earlier run would make new-session fail
        if let Err(e) = self.mux.kill_session(&name).await {
            trace!(session = %self.id, error = %e, "No stale tmux session to kill");
        }

        if let Err(e) = self
            .mux
            .create_detached_session(&name, &cwd, &self.settings.command)
            .await
        {
            error!(session = %self.id, error = %e, "Failed to start tmux session");
            return false;
        }

        self.generation = self.generation.saturating_add(1);
        self.is_running = true;
        self.last_snapshot.clear();
        info!(
            session = %self.id,
            cwd = %cwd.display(),
            generation = self.generation,
            "Session started"
        );
        self.cwd = Some(cwd);

        self.spawn_liveness_task();
        self.schedule_capture(CaptureKind::Initial);
        self.publish(SessionEvent::StatusChanged { is_running: true });
        true
    }

    async fn handle_send(&mut self, text: &str) -> bool {
        if !self.is_running {
            debug!(session = %self.id, "Send ignored, session not running");
            return false;
        }

        if let Err(e) = self
            .mux
            .send_keys(&self.settings.tmux_name, text, true)
            .await
        {
            error!(session = %self.id, error = %e, "Failed to send input");
            return false;
        }

        trace!(session = %self.id, chars = text.chars().count(), "Input sent");
        self.schedule_capture(CaptureKind::Incremental);
        true
    }

    async fn handle_interrupt(&mut self) -> bool {
        if !self.is_running {
            return false;
        }

        match self.mux.send_interrupt(&self.settings.tmux_name).await {
            Ok(()) => {
                debug!(session = %self.id, "Interrupt sent");
                true
            }
            Err(e) => {
                error!(session = %self.id, error = %e, "Failed to send interrupt");
                false
            }
        }
    }

    async fn handle_stop(&mut self) -> bool {
        if !self.is_running {
            return false;
        }

        self.cancel_liveness();
        self.is_running = false;
        self.publish(SessionEvent::StatusChanged { is_running: false });

        match self.mux.kill_session(&self.settings.tmux_name).await {
            Ok(()) => {
                info!(session = %self.id, cwd = ?self.cwd, "Session stopped");
                true
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Failed to kill tmux session");
                false
            }
        }
    }

    async fn handle_raw_output(&mut self) -> String {
        if !self.is_running {
            return String::new();
        }

        self.capture().await.unwrap_or_default()
    }

    fn status(&self) -> SessionStatus {
        if self.is_running {
            SessionStatus::running(self.generation)
        } else {
            SessionStatus::STOPPED
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn is_current(&self, generation: u64) -> bool {
        self.is_running && generation == self.generation
    }

    async fn handle_liveness_tick(&mut self, generation: u64) {
        if !self.is_current(generation) {
            trace!(session = %self.id, generation, "Ignoring stale liveness tick");
            return;
        }

        let alive = match self.mux.has_session(&self.settings.tmux_name).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Liveness probe failed");
                false
            }
        };

        if !alive {
            info!(session = %self.id, "Session process is gone, marking stopped");
            self.cancel_liveness();
            self.is_running = false;
            self.publish(SessionEvent::StatusChanged { is_running: false });
        }
    }

    async fn handle_delayed_capture(&mut self, generation: u64, kind: CaptureKind) {
        if !self.is_current(generation) {
            trace!(session = %self.id, generation, ?kind, "Discarding stale capture");
            return;
        }

        let Some(current) = self.capture().await else {
            return;
        };

        let region = match kind {
            CaptureKind::Initial => current.clone(),
            CaptureKind::Incremental => self.differ.diff(&self.last_snapshot, &current),
        };
        self.last_snapshot = current;

        let filtered = filter_output(&region);
        trace!(
            session = %self.id,
            ?kind,
            region_lines = region.lines().count(),
            kept_chars = filtered.content.len(),
            "Capture processed"
        );

        if !filtered.content.is_empty() {
            self.publish(SessionEvent::OutputFiltered {
                content: filtered.content,
                context_percent: filtered.context_percent,
            });
        }
        if let Some(context_percent) = filtered.context_percent {
            self.publish(SessionEvent::ContextUpdated { context_percent });
        }
    }

    fn spawn_liveness_task(&mut self) {
        self.cancel_liveness();

        let token = CancellationToken::new();
        self.liveness = Some(token.clone());

        let mailbox = self.mailbox.clone();
        let generation = self.generation;
        let period = self.settings.liveness_interval.max(MIN_LIVENESS_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    _ = ticker.tick() => {
                        let Some(sender) = mailbox.upgrade() else {
                            break;
                        };
                        if sender
                            .send(SessionCommand::LivenessTick { generation })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            trace!(generation, "Liveness task exiting");
        });
    }

    fn schedule_capture(&self, kind: CaptureKind) {
        let mailbox = self.mailbox.clone();
        let generation = self.generation;
        let delay = self.settings.capture_delay;

        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender
                    .send(SessionCommand::DelayedCapture { generation, kind })
                    .await;
            }
        });
    }

    fn cancel_liveness(&mut self) {
        if let Some(token) = self.liveness.take() {
            token.cancel();
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn capture(&self) -> Option<String> {
        match self
            .mux
            .capture_pane(&self.settings.tmux_name, self.settings.scrollback_lines)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(session = %self.id, error = %e, "Failed to capture pane");
                None
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}
