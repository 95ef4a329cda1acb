//! Session coordinator - composition root for terminal sessions and
//! conversation reconciliation.
//!
//! Owns an explicit [`SessionRegistry`] of instances. Each instance pairs a
//! [`SessionHandle`] with its own [`EventReconciler`] behind a mutex, plus a
//! forwarder task that republishes the session's events as
//! [`OutboundMessage`]s on one shared broadcast channel.
//!
//! Operations on unknown ids return `false` or empty values.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Poisoned locks are recovered with `PoisonError::into_inner`
//! - Session channel failures are logged and reported as `false`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use relay_core::{
    CanonicalMessage, DomainError, DomainResult, SessionId, SessionStatus, TrackerSnapshot,
};
use relay_protocol::{OutboundEvent, OutboundMessage};
use relay_tmux::Multiplexer;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::reconciler::EventReconciler;
use crate::session::{spawn_session, SessionError, SessionEvent, SessionHandle};

// ============================================================================
// Registry
// ============================================================================

struct SessionEntry {
    handle: SessionHandle,
    reconciler: Mutex<EventReconciler>,
}

impl SessionEntry {
    fn reconciler(&self) -> MutexGuard<'_, EventReconciler> {
        self.reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Instance id to session entry.
#[derive(Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn insert(&self, id: SessionId, entry: SessionEntry) -> DomainResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return Err(DomainError::SessionAlreadyExists {
                session_id: id.clone(),
            });
        }
        entries.insert(id, Arc::new(entry));
        Ok(())
    }

    fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn drain(&self) -> Vec<(SessionId, Arc<SessionEntry>)> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect()
    }

    fn contains(&self, id: &SessionId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Front door for every session operation.
pub struct SessionCoordinator {
    config: RelayConfig,
    mux: Arc<dyn Multiplexer>,
    registry: SessionRegistry,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl SessionCoordinator {
    pub fn new(config: RelayConfig, mux: Arc<dyn Multiplexer>) -> Self {
        let (outbound, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            config,
            mux,
            registry: SessionRegistry::default(),
            outbound,
        }
    }

    /// Receives every outbound event from every instance.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Registers a new, stopped instance.
    ///
    /// The id must also be a valid tmux name (see [`SessionId::parse`]).
    pub fn create_session(&self, id: SessionId) -> DomainResult<SessionHandle> {
        let id = SessionId::parse(id.as_str())?;
        if self.registry.contains(&id) {
            return Err(DomainError::SessionAlreadyExists {
                session_id: id.clone(),
            });
        }

        let settings = self.config.session_settings(&id);
        let handle = spawn_session(id.clone(), Arc::clone(&self.mux), settings);
        spawn_forwarder(id.clone(), handle.subscribe(), self.outbound.clone());

        self.registry.insert(
            id.clone(),
            SessionEntry {
                handle: handle.clone(),
                reconciler: Mutex::new(EventReconciler::new()),
            },
        )?;

        info!(session = %id, "Session created");
        Ok(handle)
    }

    /// Stops the instance if running and forgets it.
    pub async fn remove_session(&self, id: &SessionId) -> DomainResult<()> {
        let entry = self
            .registry
            .remove(id)
            .ok_or_else(|| DomainError::SessionNotFound {
                session_id: id.clone(),
            })?;

        if let Err(e) = entry.handle.stop().await {
            debug!(session = %id, error = %e, "Stop during removal failed");
        }
        info!(session = %id, "Session removed");
        Ok(())
    }

    /// Stops and forgets every instance.
    pub async fn shutdown(&self) {
        let entries = self.registry.drain();
        info!(sessions = entries.len(), "Shutting down sessions");

        for (id, entry) in entries {
            match entry.handle.stop().await {
                Ok(stopped) => debug!(session = %id, stopped, "Session shut down"),
                Err(e) => debug!(session = %id, error = %e, "Session already gone"),
            }
        }
    }

    // ========================================================================
    // Terminal operations
    // ========================================================================

    pub async fn start(&self, id: &SessionId, cwd: impl Into<PathBuf>) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "start");
        };
        flatten(id, "start", entry.handle.start(cwd).await)
    }

    pub async fn send(&self, id: &SessionId, text: impl Into<String>) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "send");
        };
        flatten(id, "send", entry.handle.send(text).await)
    }

    pub async fn interrupt(&self, id: &SessionId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "interrupt");
        };
        flatten(id, "interrupt", entry.handle.interrupt().await)
    }

    pub async fn stop(&self, id: &SessionId) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "stop");
        };
        flatten(id, "stop", entry.handle.stop().await)
    }

    pub async fn raw_output(&self, id: &SessionId) -> String {
        let Some(entry) = self.registry.get(id) else {
            return String::new();
        };
        entry.handle.raw_output().await.unwrap_or_default()
    }

    pub async fn status(&self, id: &SessionId) -> SessionStatus {
        let Some(entry) = self.registry.get(id) else {
            return SessionStatus::STOPPED;
        };
        entry
            .handle
            .status()
            .await
            .unwrap_or(SessionStatus::STOPPED)
    }

    // ========================================================================
    // Conversation feed
    // ========================================================================

    /// Replaces the instance's conversation with a history replay.
    pub fn ingest_history(&self, id: &SessionId, records: &[Value]) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "ingest_history");
        };

        let (messages, tools) = {
            let mut reconciler = entry.reconciler();
            reconciler.reconcile_history(records);
            (reconciler.displayed_messages(), reconciler.tracker().snapshot())
        };
        self.publish_conversation(id, messages, tools);
        true
    }

    /// Applies live deltas; publishes only when the conversation changed.
    pub fn ingest_deltas(&self, id: &SessionId, deltas: &[Value]) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return unknown(id, "ingest_deltas");
        };

        let update = {
            let mut reconciler = entry.reconciler();
            reconciler
                .reconcile_delta(deltas)
                .then(|| (reconciler.displayed_messages(), reconciler.tracker().snapshot()))
        };
        if let Some((messages, tools)) = update {
            self.publish_conversation(id, messages, tools);
        }
        true
    }

    /// Displayed conversation, empty for unknown ids.
    pub fn messages(&self, id: &SessionId) -> Vec<CanonicalMessage> {
        self.registry
            .get(id)
            .map(|entry| entry.reconciler().displayed_messages())
            .unwrap_or_default()
    }

    pub fn tool_snapshot(&self, id: &SessionId) -> Option<TrackerSnapshot> {
        self.registry
            .get(id)
            .map(|entry| entry.reconciler().tracker().snapshot())
    }

    fn publish_conversation(
        &self,
        id: &SessionId,
        messages: Vec<CanonicalMessage>,
        tools: TrackerSnapshot,
    ) {
        let _ = self.outbound.send(OutboundMessage::new(
            id.clone(),
            OutboundEvent::MessagesUpdated { messages },
        ));
        let _ = self.outbound.send(OutboundMessage::new(
            id.clone(),
            OutboundEvent::ToolsUpdated { tools },
        ));
    }
}

fn unknown(id: &SessionId, operation: &str) -> bool {
    debug!(session = %id, operation, "Unknown session");
    false
}

fn flatten(id: &SessionId, operation: &str, result: Result<bool, SessionError>) -> bool {
    result.unwrap_or_else(|e| {
        warn!(session = %id, operation, error = %e, "Session unavailable");
        false
    })
}

// ============================================================================
// Forwarding
// ============================================================================

/// Maps a session event onto the outbound wire event.
pub fn to_outbound(event: SessionEvent) -> OutboundEvent {
    match event {
        SessionEvent::OutputFiltered {
            content,
            context_percent,
        } => OutboundEvent::OutputFiltered {
            content,
            context_percent,
        },
        SessionEvent::ContextUpdated { context_percent } => {
            OutboundEvent::ContextUpdated { context_percent }
        }
        SessionEvent::StatusChanged { is_running } => OutboundEvent::StatusChanged { is_running },
    }
}

/// Republishes session events until the session's event channel closes,
/// which happens once the entry and every outside handle are dropped.
fn spawn_forwarder(
    id: SessionId,
    mut events: broadcast::Receiver<SessionEvent>,
    outbound: broadcast::Sender<OutboundMessage>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let _ = outbound.send(OutboundMessage::new(id.clone(), to_outbound(event)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session = %id, skipped, "Forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(session = %id, "Forwarder stopped");
    });
}
