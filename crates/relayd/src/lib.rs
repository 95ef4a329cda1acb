//! relayd - terminal session actors, conversation reconciliation and broadcast
//!
//! - `session` - one actor per tmux-hosted assistant (start, send, capture, liveness)
//! - `reconciler` - history and live deltas folded into one conversation
//! - `coordinator` - registry of instances and the outbound event channel
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SessionCoordinator                       │
//! │                                                              │
//! │  SessionRegistry: id → (SessionHandle, Mutex<EventReconciler>)│
//! │                                                              │
//! │  ┌──────────────┐  SessionEvent   ┌─────────────┐            │
//! │  │ SessionActor │────────────────▶│  forwarder  │──┐         │
//! │  └──────┬───────┘                 └─────────────┘  │         │
//! │         │ tmux                                     ▼         │
//! │         ▼                          broadcast::Sender<Outbound>│
//! │  ┌──────────────┐                                  ▲         │
//! │  │  Multiplexer │     ingest_history/ingest_deltas ┘         │
//! │  └──────────────┘                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod coordinator;
pub mod reconciler;
pub mod session;

pub use config::{ConfigError, RelayConfig};
pub use coordinator::{SessionCoordinator, SessionRegistry};
pub use reconciler::EventReconciler;
pub use session::{spawn_session, SessionError, SessionEvent, SessionHandle, SessionSettings};
