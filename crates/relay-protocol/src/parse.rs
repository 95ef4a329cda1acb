//! Parsing Claude Code conversation records and live deltas.
//!
//! Two inbound shapes are normalized into [`CanonicalMessage`]s:
//!
//! - **History records**: transcript lines tagged `user`/`assistant`/`system`
//!   whose `message.content` is a string or an array of typed blocks.
//! - **Live deltas**: either record-shaped, or carrying the variant directly
//!   at the top level (`tool_use`, `tool_result`, `assistant`, `human`,
//!   `system`, `session`, `context`) or as a `role` + `content` pair.
//!
//! Deltas go through an ordered list of probes. Each probe recognizes one
//! shape and returns `None` otherwise; the first match wins. Anything no
//! probe recognizes is dropped.

use chrono::DateTime;
use relay_core::tool::flatten_text;
use relay_core::{
    now_millis, CanonicalMessage, ContextStats, MessageKind, SessionInfo, ToolOutcome,
    ToolResultPayload, ToolUseId,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

// ============================================================================
// Raw wire shapes
// ============================================================================

/// One transcript record.
///
/// Every field is optional; the record kind decides which ones matter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    /// RFC 3339 string or epoch milliseconds
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    /// Top-level content, used by `system` records
    #[serde(default)]
    pub content: Option<Value>,
    /// Structured tool result metadata (agent totals and the like)
    #[serde(rename = "toolUseResult", default)]
    pub tool_use_result: Option<Value>,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// A typed content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSession {
    #[serde(alias = "session_id", alias = "sessionId")]
    id: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default, alias = "created_at", alias = "createdAt")]
    created: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawUsage {
    #[serde(default, alias = "percentage", alias = "context_percent")]
    percent: Option<u64>,
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default, alias = "cache_read_input_tokens")]
    cache_read_tokens: Option<u64>,
    #[serde(default, alias = "cache_creation_input_tokens")]
    cache_creation_tokens: Option<u64>,
}

impl RawUsage {
    fn into_stats(self) -> Option<ContextStats> {
        let stats = ContextStats {
            percent: self
                .percent
                .and_then(|p| u8::try_from(p).ok())
                .filter(|p| *p <= 100),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
        };
        (stats != ContextStats::default()).then_some(stats)
    }
}

// ============================================================================
// Normalized output
// ============================================================================

/// A canonical message plus the side-channel data the reconciler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub message: CanonicalMessage,
    /// Outcome handed to the tool tracker, for `tool_result` messages
    pub outcome: Option<ToolOutcome>,
    /// Agent that issued this tool call, when the feed says so
    pub parent_tool_use_id: Option<ToolUseId>,
}

impl Normalized {
    fn new(message: CanonicalMessage) -> Self {
        Self {
            message,
            outcome: None,
            parent_tool_use_id: None,
        }
    }
}

/// Parses a timestamp given as RFC 3339 text or epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Parses newline-delimited JSON, skipping blank and malformed lines.
pub fn parse_jsonl(text: &str) -> Vec<Value> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(e) => {
                trace!(line = index + 1, error = %e, "Skipping malformed JSONL line");
                None
            }
        })
        .collect()
}

// ============================================================================
// History records
// ============================================================================

/// Normalizes one history record.
///
/// A `tool_use` or `tool_result` block wins over text; otherwise all text
/// blocks are concatenated. Records without extractable content yield `None`.
pub fn normalize_record(value: &Value) -> Option<Normalized> {
    let record = RawRecord::deserialize(value).ok()?;
    let kind = record.kind.as_deref()?;
    if !matches!(kind, "user" | "assistant" | "system") {
        trace!(kind, "Skipping non-conversation record");
        return None;
    }

    let content = record
        .message
        .as_ref()
        .and_then(|m| m.content.as_ref())
        .or(record.content.as_ref())?;

    let normalized = match first_tool_block(content) {
        Some(block) => tool_block_message(block, &record)?,
        None => {
            let text = block_text(content)?;
            Normalized::new(text_message(kind, text))
        }
    };

    Some(stamp(normalized, &record))
}

fn text_message(kind: &str, text: String) -> CanonicalMessage {
    match kind {
        "assistant" => CanonicalMessage::assistant(text),
        "system" => CanonicalMessage::system(text),
        _ => CanonicalMessage::human(text),
    }
}

/// Copies uuid, timestamp and parent id from the record.
fn stamp(mut normalized: Normalized, record: &RawRecord) -> Normalized {
    let timestamp = record
        .timestamp
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or_else(now_millis);
    normalized.message = normalized
        .message
        .with_timestamp(timestamp)
        .with_uuid(record.uuid.clone());
    if normalized.parent_tool_use_id.is_none() {
        normalized.parent_tool_use_id = record.parent_tool_use_id.clone().map(ToolUseId::from);
    }
    normalized
}

fn blocks(content: &Value) -> impl Iterator<Item = RawBlock> + '_ {
    content
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|block| RawBlock::deserialize(block).ok())
}

fn first_tool_block(content: &Value) -> Option<RawBlock> {
    blocks(content).find(|b| matches!(b, RawBlock::ToolUse { .. } | RawBlock::ToolResult { .. }))
}

/// Plain string content, or the text blocks joined by newlines.
fn block_text(content: &Value) -> Option<String> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(_) => blocks(content)
            .filter_map(|b| match b {
                RawBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    non_blank(text)
}

fn non_blank(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

fn tool_block_message(block: RawBlock, record: &RawRecord) -> Option<Normalized> {
    match block {
        RawBlock::ToolUse { id, name, input } => Some(Normalized::new(
            CanonicalMessage::tool_use(ToolUseId::from(id), name, input),
        )),
        RawBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(tool_result_message(
            tool_use_id,
            &content,
            is_error,
            record.tool_use_result.as_ref(),
        )),
        RawBlock::Text { .. } | RawBlock::Other => None,
    }
}

/// Builds a `tool_result` message and the outcome for the tracker.
///
/// `details` is used for the outcome when it is an object, otherwise the
/// outcome carries just the textual content.
fn tool_result_message(
    tool_use_id: String,
    content: &Value,
    is_error: bool,
    details: Option<&Value>,
) -> Normalized {
    let text = flatten_text(content).unwrap_or_default();
    let details = details.filter(|d| d.is_object()).cloned();
    let outcome = match &details {
        Some(obj) => ToolOutcome::from_value(obj),
        None => ToolOutcome::from_content(text.clone()),
    };

    let payload = ToolResultPayload {
        tool_use_id: Some(ToolUseId::from(tool_use_id)),
        content: text,
        is_error,
        details,
    };

    Normalized {
        message: CanonicalMessage::tool_result(payload),
        outcome: Some(outcome),
        parent_tool_use_id: None,
    }
}

// ============================================================================
// Live deltas
// ============================================================================

/// A probe recognizes one delta shape.
pub type Probe = fn(&Value) -> Option<Normalized>;

/// Delta probes in priority order.
pub const DELTA_PROBES: &[(&str, Probe)] = &[
    ("tool_use", probe_tool_use),
    ("tool_result", probe_tool_result),
    ("assistant", probe_assistant),
    ("human", probe_human),
    ("system", probe_system),
    ("session", probe_session),
    ("context", probe_context),
];

/// Normalizes one live delta with the first matching probe.
pub fn normalize_delta(delta: &Value) -> Option<Normalized> {
    let record = delta_stamp(delta);
    DELTA_PROBES.iter().find_map(|(name, probe)| {
        let normalized = probe(delta)?;
        trace!(probe = name, "Delta matched");
        Some(stamp(normalized, &record))
    })
}

/// Stamp fields read one by one, so a mistyped sibling field cannot drop them.
fn delta_stamp(delta: &Value) -> RawRecord {
    let text = |key: &str| delta.get(key).and_then(Value::as_str).map(str::to_string);
    RawRecord {
        uuid: text("uuid"),
        timestamp: delta.get("timestamp").cloned(),
        parent_tool_use_id: text("parent_tool_use_id"),
        ..RawRecord::default()
    }
}

/// Block of the embedded `message.content` (or top-level `content`) array matching `pred`.
fn embedded_block(delta: &Value, pred: fn(&RawBlock) -> bool) -> Option<RawBlock> {
    let content = delta
        .get("message")
        .and_then(|m| m.get("content"))
        .or_else(|| delta.get("content"))?;
    blocks(content).find(pred)
}

fn probe_tool_use(delta: &Value) -> Option<Normalized> {
    let block = match delta.get("tool_use") {
        Some(direct) => {
            let id = direct.get("id")?.as_str()?;
            let name = direct.get("name")?.as_str()?;
            RawBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: direct.get("input").cloned().unwrap_or(Value::Null),
            }
        }
        None => embedded_block(delta, |b| matches!(b, RawBlock::ToolUse { .. }))?,
    };
    tool_block_message(block, &RawRecord::default())
}

fn probe_tool_result(delta: &Value) -> Option<Normalized> {
    let details = delta.get("toolUseResult");
    let block = match delta.get("tool_result") {
        Some(direct) => RawBlock::ToolResult {
            tool_use_id: direct.get("tool_use_id")?.as_str()?.to_string(),
            content: direct.get("content").cloned().unwrap_or(Value::Null),
            is_error: direct
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        None => embedded_block(delta, |b| matches!(b, RawBlock::ToolResult { .. }))?,
    };
    match block {
        RawBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(tool_result_message(tool_use_id, &content, is_error, details)),
        _ => None,
    }
}

/// Text of a direct variant field: a string, or an object with `text`/`content`.
fn direct_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => value
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| value.get("content").and_then(flatten_text)),
        _ => None,
    }?;
    non_blank(text)
}

/// Text of a delta shaped as `field`, `role` + `content`, or a typed record.
fn shaped_text(delta: &Value, field: &str, role: &str, record_kind: &str) -> Option<String> {
    if let Some(direct) = delta.get(field) {
        return direct_text(direct);
    }
    if delta.get("role").and_then(Value::as_str) == Some(role) {
        return delta.get("content").and_then(block_text);
    }
    if delta.get("type").and_then(Value::as_str) == Some(record_kind) {
        let message = delta.get("message")?;
        return message
            .get("content")
            .and_then(block_text)
            .or_else(|| message.as_str().map(str::to_string).and_then(non_blank));
    }
    None
}

fn probe_assistant(delta: &Value) -> Option<Normalized> {
    let text = shaped_text(delta, "assistant", "assistant", "assistant")?;
    Some(Normalized::new(CanonicalMessage::assistant(text)))
}

fn probe_human(delta: &Value) -> Option<Normalized> {
    let text = shaped_text(delta, "human", "user", "user")?;
    Some(Normalized::new(CanonicalMessage::human(text)))
}

fn probe_system(delta: &Value) -> Option<Normalized> {
    let text = shaped_text(delta, "system", "system", "system")
        .or_else(|| {
            (delta.get("type").and_then(Value::as_str) == Some("system"))
                .then(|| delta.get("content").and_then(block_text))
                .flatten()
        })?;
    Some(Normalized::new(CanonicalMessage::system(text)))
}

fn probe_session(delta: &Value) -> Option<Normalized> {
    let source = match delta.get("session") {
        Some(direct) => direct,
        None if delta.get("type").and_then(Value::as_str) == Some("session") => delta,
        None => return None,
    };
    let raw = RawSession::deserialize(source).ok()?;
    let info = SessionInfo {
        id: raw.id,
        cwd: raw.cwd,
        created: raw.created.as_ref().and_then(parse_timestamp),
    };
    Some(Normalized::new(CanonicalMessage::new(MessageKind::Session(
        info,
    ))))
}

fn probe_context(delta: &Value) -> Option<Normalized> {
    let source = delta
        .get("context")
        .or_else(|| delta.get("usage"))
        .filter(|v| v.is_object())?;
    let stats = RawUsage::deserialize(source).ok()?.into_stats()?;
    Some(Normalized::new(CanonicalMessage::new(MessageKind::Context(
        stats,
    ))))
}
