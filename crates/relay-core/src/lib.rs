//! Relay Core - Domain types for Claude Code session mirroring
//!
//! This crate provides the pure, I/O-free pieces shared between the
//! wire protocol (relay-protocol) and the daemon (relayd):
//!
//! - `filter` / `diff` - turning raw tmux captures into presentable output
//! - `message` - the canonical conversation model
//! - `tracker` - tool and agent execution bookkeeping
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod agent;
pub mod diff;
pub mod error;
pub mod filter;
pub mod message;
pub mod session;
pub mod tokens;
pub mod tool;
pub mod tracker;

// Re-exports for convenience
pub use agent::AgentType;
pub use diff::{diff_snapshots, DiffMode, OutputDiffer, SnapshotDelta};
pub use error::{DomainError, DomainResult};
pub use filter::{filter_output, FilteredOutput};
pub use message::{
    now_millis, CanonicalMessage, ContextStats, MessageKind, SessionInfo, ToolResultPayload,
};
pub use session::{SessionId, SessionStatus};
pub use tokens::TokenCount;
pub use tool::{ToolExecution, ToolOutcome, ToolStatus, ToolUseId};
pub use tracker::{ToolTracker, TrackerSnapshot, MAX_COMPLETED_AGENTS, MAX_COMPLETED_TOOLS};
