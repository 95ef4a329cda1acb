//! Relay Protocol - Wire shapes for relay
//!
//! This crate provides parsing of the inbound Claude Code conversation
//! feed (history records and live deltas) into the canonical message
//! model, and the outbound event types published to subscribers.

pub mod event;
pub mod parse;
pub mod version;

pub use event::{OutboundEvent, OutboundMessage};
pub use parse::{
    normalize_delta, normalize_record, parse_jsonl, parse_timestamp, Normalized, RawBlock,
    RawMessage, RawRecord,
};
pub use version::ProtocolVersion;
