//! In-memory ledger of tool and agent executions.
//!
//! The tracker is a pure reducer over `start_tool` / `complete_tool`
//! calls. It never performs I/O and never fails: unknown completions
//! produce placeholders, duplicate starts are ignored.
//!
//! # Agent attribution
//!
//! Claude Code does not report which sub-agent owns a tool call that
//! runs while several agents are active. Every non-agent invocation is
//! therefore attributed to **all** agents active at the moment it
//! starts. Aggregated counts downstream rely on this behavior.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{TokenCount, ToolExecution, ToolOutcome, ToolUseId};

/// Completed executions kept, most recent first.
pub const MAX_COMPLETED_TOOLS: usize = 10;

/// Completed agents kept, most recent first.
pub const MAX_COMPLETED_AGENTS: usize = 5;

/// "12 tool uses", "1 tool use"
static TOOL_USES_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+tool\s+uses?\b").ok());

/// "850 tokens", "2k tokens", "1.4M tokens"
static TOKENS_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([km])?\s+tokens?\b").ok());

/// Tool and agent bookkeeping for one conversation.
#[derive(Debug, Default)]
pub struct ToolTracker {
    /// In-flight executions in start order
    running: Vec<ToolExecution>,
    completed: VecDeque<ToolExecution>,
    completed_agents: VecDeque<ToolExecution>,
    /// Agents currently running, in start order
    active_agents: Vec<ToolUseId>,
    agent_tool_counts: HashMap<ToolUseId, u64>,
    agent_tool_ids: HashMap<ToolUseId, Vec<ToolUseId>>,
    /// Executions indexed under an explicit parent id
    nested_tools: HashMap<ToolUseId, Vec<ToolExecution>>,
    /// Every id ever started or completed; an id starts at most once
    seen: HashSet<ToolUseId>,
    total_tool_uses: u64,
}

impl ToolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a tool invocation.
    ///
    /// Returns `false` when the id was already known and the call was ignored.
    pub fn start_tool(
        &mut self,
        id: ToolUseId,
        name: &str,
        input: &Value,
        parent_id: Option<ToolUseId>,
    ) -> bool {
        if !self.seen.insert(id.clone()) {
            trace!(tool_use_id = %id, "Ignoring duplicate tool start");
            return false;
        }

        let execution = ToolExecution::start(id.clone(), name, input, parent_id.clone());
        self.total_tool_uses = self.total_tool_uses.saturating_add(1);

        if execution.is_agent {
            debug!(
                tool_use_id = %id,
                agent_type = ?execution.agent_type,
                "Agent started"
            );
            self.active_agents.push(id.clone());
            self.agent_tool_counts.insert(id.clone(), 0);
            self.agent_tool_ids.insert(id.clone(), Vec::new());
        } else {
            for agent_id in &self.active_agents {
                let count = self.agent_tool_counts.entry(agent_id.clone()).or_insert(0);
                *count = count.saturating_add(1);
                self.agent_tool_ids
                    .entry(agent_id.clone())
                    .or_default()
                    .push(id.clone());
            }
            // Keep the running agent records in step with the counters
            for agent in self.running.iter_mut().filter(|e| e.is_agent) {
                if let Some(count) = self.agent_tool_counts.get(&agent.id) {
                    agent.tool_count = *count;
                }
            }
        }

        if let Some(parent) = parent_id {
            self.nested_tools
                .entry(parent)
                .or_default()
                .push(execution.clone());
        }

        self.running.push(execution);
        true
    }

    /// Records the completion of a tool invocation.
    ///
    /// Completing an id that is not running synthesizes a placeholder entry.
    pub fn complete_tool(&mut self, id: ToolUseId, has_error: bool, result: Option<&ToolOutcome>) {
        let now = Utc::now();

        let mut execution = match self.running.iter().position(|e| e.id == id) {
            Some(pos) => {
                let mut execution = self.running.remove(pos);
                execution.finish(has_error, now);
                execution
            }
            None => {
                debug!(tool_use_id = %id, "Completion for unknown tool, using placeholder");
                self.seen.insert(id.clone());
                ToolExecution::placeholder(id.clone(), has_error)
            }
        };

        if execution.is_agent {
            self.active_agents.retain(|agent_id| agent_id != &id);
            execution.tool_count = self.agent_tool_count(&id);
            if let Some(outcome) = result {
                apply_agent_outcome(&mut execution, outcome);
            }
            debug!(
                tool_use_id = %id,
                tool_count = execution.tool_count,
                token_count = ?execution.token_count,
                "Agent completed"
            );

            self.completed_agents.push_front(execution.clone());
            self.completed_agents.truncate(MAX_COMPLETED_AGENTS);
        }

        if let Some(parent) = execution.parent_agent.clone() {
            if let Some(siblings) = self.nested_tools.get_mut(&parent) {
                if let Some(entry) = siblings.iter_mut().find(|e| e.id == id) {
                    *entry = execution.clone();
                }
            }
        }

        trace!(
            tool_use_id = %id,
            status = %execution.status,
            duration_ms = ?execution.duration_ms,
            "Tool finished"
        );
        self.completed.push_front(execution);
        self.completed.truncate(MAX_COMPLETED_TOOLS);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn running(&self) -> &[ToolExecution] {
        &self.running
    }

    /// Up to `n` most recently completed executions, newest first.
    pub fn recent_completed(&self, n: usize) -> impl Iterator<Item = &ToolExecution> {
        self.completed.iter().take(n)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Recently completed agents, newest first.
    pub fn completed_agents(&self) -> impl Iterator<Item = &ToolExecution> {
        self.completed_agents.iter()
    }

    /// Agents still running, in start order.
    pub fn active_agents(&self) -> impl Iterator<Item = &ToolExecution> {
        self.running.iter().filter(|e| e.is_agent)
    }

    /// Executions started with an explicit `parent_id`.
    pub fn nested_tools(&self, parent_id: &ToolUseId) -> &[ToolExecution] {
        self.nested_tools
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Ids of invocations attributed to an agent.
    pub fn agent_tool_ids(&self, agent_id: &ToolUseId) -> &[ToolUseId] {
        self.agent_tool_ids
            .get(agent_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn agent_tool_count(&self, agent_id: &ToolUseId) -> u64 {
        self.agent_tool_counts.get(agent_id).copied().unwrap_or(0)
    }

    /// Total invocations ever started. Never decremented.
    pub fn total_tool_uses(&self) -> u64 {
        self.total_tool_uses
    }

    /// Returns true if the id was ever started or completed.
    pub fn is_known(&self, id: &ToolUseId) -> bool {
        self.seen.contains(id)
    }

    /// Clears all state. Used when a fresh history replaces the conversation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Serializable view for presentation layers.
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            running: self.running.clone(),
            completed: self.completed.iter().cloned().collect(),
            completed_agents: self.completed_agents.iter().cloned().collect(),
            active_agent_count: self.active_agents.len(),
            total_tool_uses: self.total_tool_uses,
        }
    }
}

/// Point-in-time copy of the tracker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub running: Vec<ToolExecution>,
    pub completed: Vec<ToolExecution>,
    pub completed_agents: Vec<ToolExecution>,
    pub active_agent_count: usize,
    pub total_tool_uses: u64,
}

/// Fills agent totals. Explicit numeric fields win over text extraction.
fn apply_agent_outcome(execution: &mut ToolExecution, outcome: &ToolOutcome) {
    let content = outcome.content.as_deref();

    if let Some(count) = outcome
        .total_tool_use_count
        .or_else(|| content.and_then(extract_tool_uses))
    {
        execution.tool_count = count;
    }

    if let Some(tokens) = outcome
        .total_tokens
        .map(TokenCount::new)
        .or_else(|| content.and_then(extract_tokens))
    {
        execution.token_count = Some(tokens);
    }

    if let Some(duration_ms) = outcome.total_duration_ms {
        execution.duration_ms = Some(duration_ms);
    }
}

fn extract_tool_uses(text: &str) -> Option<u64> {
    let caps = TOOL_USES_REGEX.as_ref()?.captures(text)?;
    caps.get(1)?.as_str().parse().ok()
}

fn extract_tokens(text: &str) -> Option<TokenCount> {
    let caps = TOKENS_REGEX.as_ref()?.captures(text)?;
    let number = caps.get(1)?.as_str();
    let suffix = caps.get(2).map(|m| m.as_str());
    TokenCount::from_abbreviated(number, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolStatus;
    use serde_json::json;

    fn agent_input() -> Value {
        json!({"subagent_type": "general-purpose", "description": "Refactor parser"})
    }

    fn id(s: &str) -> ToolUseId {
        ToolUseId::new(s)
    }

    #[test]
    fn test_tools_under_active_agent_are_attributed() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        tracker.start_tool(id("read"), "Read", &json!({"file_path": "a.rs"}), None);
        tracker.start_tool(id("grep"), "Grep", &json!({"pattern": "fn"}), None);

        assert_eq!(tracker.agent_tool_count(&id("agent")), 2);
        assert_eq!(tracker.agent_tool_ids(&id("agent")).len(), 2);
        assert_eq!(tracker.total_tool_uses(), 3);
        assert_eq!(tracker.running_count(), 3);
    }

    #[test]
    fn test_concurrent_agents_each_receive_attribution() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("a1"), "Task", &agent_input(), None);
        tracker.start_tool(id("a2"), "Task", &agent_input(), None);
        tracker.start_tool(id("bash"), "Bash", &json!({}), None);

        assert_eq!(tracker.agent_tool_count(&id("a1")), 1);
        assert_eq!(tracker.agent_tool_count(&id("a2")), 1);
        assert_eq!(tracker.agent_tool_ids(&id("a1")), &[id("bash")]);
        assert_eq!(tracker.agent_tool_ids(&id("a2")), &[id("bash")]);
    }

    #[test]
    fn test_tools_after_agent_completion_are_not_attributed() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        tracker.start_tool(id("t1"), "Read", &json!({}), None);
        tracker.complete_tool(id("agent"), false, None);
        tracker.start_tool(id("t2"), "Read", &json!({}), None);

        assert_eq!(tracker.agent_tool_count(&id("agent")), 1);
        assert_eq!(tracker.active_agents().count(), 0);
        let agent = tracker.completed_agents().next().unwrap();
        assert_eq!(agent.tool_count, 1);
    }

    #[test]
    fn test_numeric_totals_win_over_text() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        let outcome = ToolOutcome {
            content: Some("Done (3 tool uses · 2k tokens · 4s)".to_string()),
            total_tokens: Some(5000),
            ..ToolOutcome::default()
        };
        tracker.complete_tool(id("agent"), false, Some(&outcome));

        let agent = tracker.completed_agents().next().unwrap();
        assert_eq!(agent.token_count, Some(TokenCount::new(5000)));
        // tool count had no numeric field, so the text wins
        assert_eq!(agent.tool_count, 3);
    }

    #[test]
    fn test_text_extraction_normalizes_suffixes() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        let outcome = ToolOutcome::from_content("Finished: 14 tool uses, 1.5m tokens");
        tracker.complete_tool(id("agent"), false, Some(&outcome));

        let agent = tracker.completed_agents().next().unwrap();
        assert_eq!(agent.tool_count, 14);
        assert_eq!(agent.token_count, Some(TokenCount::new(1_500_000)));
    }

    #[test]
    fn test_numeric_duration_overrides_measured() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        let outcome = ToolOutcome {
            total_duration_ms: Some(42_000),
            total_tool_use_count: Some(9),
            ..ToolOutcome::default()
        };
        tracker.complete_tool(id("agent"), false, Some(&outcome));

        let agent = tracker.completed_agents().next().unwrap();
        assert_eq!(agent.duration_ms, Some(42_000));
        assert_eq!(agent.tool_count, 9);
    }

    #[test]
    fn test_completed_history_is_capped() {
        let mut tracker = ToolTracker::new();
        for i in 0..15 {
            let tool_id = id(&format!("t{i}"));
            tracker.start_tool(tool_id.clone(), "Read", &json!({}), None);
            tracker.complete_tool(tool_id, false, None);
        }

        assert_eq!(tracker.completed_count(), MAX_COMPLETED_TOOLS);
        let ids: Vec<&str> = tracker.recent_completed(20).map(|e| e.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"t14"));
        assert_eq!(ids.last(), Some(&"t5"));
        assert!(!ids.contains(&"t4"));
    }

    #[test]
    fn test_completed_agents_are_capped() {
        let mut tracker = ToolTracker::new();
        for i in 0..7 {
            let agent_id = id(&format!("a{i}"));
            tracker.start_tool(agent_id.clone(), "Task", &agent_input(), None);
            tracker.complete_tool(agent_id, false, None);
        }
        assert_eq!(tracker.completed_agents().count(), MAX_COMPLETED_AGENTS);
        assert_eq!(tracker.completed_agents().next().unwrap().id, id("a6"));
    }

    #[test]
    fn test_unknown_completion_synthesizes_placeholder() {
        let mut tracker = ToolTracker::new();
        tracker.complete_tool(id("ghost"), true, None);

        let entry = tracker.recent_completed(1).next().unwrap();
        assert_eq!(entry.id, id("ghost"));
        assert_eq!(entry.status, ToolStatus::Error);
        assert_eq!(entry.name, "unknown");
        assert!(tracker.is_known(&id("ghost")));
    }

    #[test]
    fn test_duplicate_start_is_ignored() {
        let mut tracker = ToolTracker::new();
        assert!(tracker.start_tool(id("t1"), "Read", &json!({}), None));
        assert!(!tracker.start_tool(id("t1"), "Read", &json!({}), None));
        assert_eq!(tracker.running_count(), 1);
        assert_eq!(tracker.total_tool_uses(), 1);
    }

    #[test]
    fn test_explicit_parent_indexes_nested_tools() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("parent"), "Task", &agent_input(), None);
        tracker.start_tool(id("child"), "Read", &json!({}), Some(id("parent")));
        assert_eq!(tracker.nested_tools(&id("parent")).len(), 1);

        tracker.complete_tool(id("child"), false, None);
        let nested = tracker.nested_tools(&id("parent"));
        assert_eq!(nested.first().map(|e| e.status), Some(ToolStatus::Completed));
        assert!(tracker.nested_tools(&id("other")).is_empty());
    }

    #[test]
    fn test_total_counter_survives_completion() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("t1"), "Read", &json!({}), None);
        tracker.complete_tool(id("t1"), false, None);
        assert_eq!(tracker.total_tool_uses(), 1);
        assert_eq!(tracker.running_count(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        tracker.start_tool(id("t1"), "Read", &json!({}), None);
        tracker.reset();

        assert_eq!(tracker.running_count(), 0);
        assert_eq!(tracker.total_tool_uses(), 0);
        assert!(tracker.agent_tool_ids(&id("agent")).is_empty());
        assert!(!tracker.is_known(&id("t1")));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut tracker = ToolTracker::new();
        tracker.start_tool(id("agent"), "Task", &agent_input(), None);
        tracker.start_tool(id("t1"), "Read", &json!({}), None);
        tracker.complete_tool(id("t1"), false, None);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.running.len(), 1);
        assert_eq!(snapshot.completed.len(), 1);
        assert_eq!(snapshot.active_agent_count, 1);
        assert_eq!(snapshot.total_tool_uses, 2);
        assert_eq!(snapshot.running.first().map(|e| e.tool_count), Some(1));
    }
}
