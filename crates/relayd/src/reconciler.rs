//! Conversation reconciliation.
//!
//! [`EventReconciler`] folds history records and live deltas into one
//! ordered list of [`CanonicalMessage`]s and keeps a [`ToolTracker`] in
//! step with it.
//!
//! Merge rules, shared by both entry points:
//!
//! - A `tool_result` whose id matches an earlier `tool_use` is merged into
//!   it; otherwise it is appended standalone.
//! - A repeated `tool_use` id, a second result for a resolved `tool_use`,
//!   and a repeated record uuid are dropped.
//! - A `tool_use` arriving after its standalone result adopts that result.
//!
//! Standalone results are kept in storage; [`EventReconciler::displayed_messages`]
//! hides the ones some `tool_use` has claimed.

use std::collections::{HashMap, HashSet};

use relay_core::{CanonicalMessage, MessageKind, ToolTracker, ToolUseId};
use relay_protocol::{normalize_delta, normalize_record, Normalized};
use serde_json::Value;
use tracing::{debug, trace};

/// Single-writer reducer for one conversation.
#[derive(Debug, Default)]
pub struct EventReconciler {
    messages: Vec<CanonicalMessage>,
    tracker: ToolTracker,
    /// Lookup indexes into `messages`, which only ever grows until cleared
    uuids: HashSet<String>,
    tool_uses: HashMap<ToolUseId, usize>,
    standalone_results: HashMap<ToolUseId, usize>,
}

impl EventReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the conversation with a full history replay.
    ///
    /// Resets the tool tracker. Returns the number of stored messages.
    pub fn reconcile_history(&mut self, records: &[Value]) -> usize {
        self.clear();

        let mut dropped = 0usize;
        for record in records {
            match normalize_record(record) {
                Some(normalized) => {
                    self.apply(normalized);
                }
                None => dropped = dropped.saturating_add(1),
            }
        }

        debug!(
            records = records.len(),
            dropped,
            messages = self.messages.len(),
            "History reconciled"
        );
        self.messages.len()
    }

    /// Applies live deltas in order.
    ///
    /// Returns `true` when the stored list changed.
    pub fn reconcile_delta(&mut self, deltas: &[Value]) -> bool {
        let mut changed = false;
        for delta in deltas {
            match normalize_delta(delta) {
                Some(normalized) => changed |= self.apply(normalized),
                None => trace!("Dropping unrecognized delta"),
            }
        }
        changed
    }

    /// Every stored message, including claimed standalone results.
    pub fn messages(&self) -> &[CanonicalMessage] {
        &self.messages
    }

    /// Messages for presentation: each tool call appears once.
    pub fn displayed_messages(&self) -> Vec<CanonicalMessage> {
        let claimed: HashSet<&ToolUseId> = self
            .messages
            .iter()
            .filter_map(CanonicalMessage::tool_use_id)
            .collect();

        self.messages
            .iter()
            .filter(|m| !m.result_for().is_some_and(|id| claimed.contains(id)))
            .cloned()
            .collect()
    }

    pub fn tracker(&self) -> &ToolTracker {
        &self.tracker
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.tracker.reset();
        self.uuids.clear();
        self.tool_uses.clear();
        self.standalone_results.clear();
    }

    // ========================================================================
    // Merge
    // ========================================================================

    fn apply(&mut self, normalized: Normalized) -> bool {
        let Normalized {
            message,
            outcome,
            parent_tool_use_id,
        } = normalized;

        if let Some(uuid) = message.uuid.as_deref() {
            if self.uuids.contains(uuid) {
                trace!(uuid, "Dropping duplicate record");
                return false;
            }
        }

        match &message.kind {
            MessageKind::ToolUse { id, name, input, .. } => {
                let id = id.clone();
                if self.find_tool_use(&id).is_some() {
                    trace!(tool_use_id = %id, "Dropping duplicate tool_use");
                    return false;
                }
                self.tracker
                    .start_tool(id.clone(), name, input, parent_tool_use_id);

                let mut message = message;
                if let Some(orphan) = self.find_standalone_result(&id) {
                    debug!(tool_use_id = %id, "tool_use adopting earlier result");
                    message.merge_result(orphan);
                }
                self.tool_uses.insert(id, self.messages.len());
                self.push(message);
                true
            }
            MessageKind::ToolResult(payload) => {
                let Some(id) = payload.tool_use_id.clone() else {
                    self.push(message);
                    return true;
                };
                let is_error = payload.is_error;

                match self.find_tool_use(&id) {
                    Some(pos) => {
                        let Some(target) = self.messages.get_mut(pos) else {
                            return false;
                        };
                        if target.is_resolved() {
                            trace!(tool_use_id = %id, "Dropping repeated result");
                            return false;
                        }
                        if let MessageKind::ToolResult(payload) = message.kind {
                            target.merge_result(payload);
                        }
                    }
                    None => {
                        if self.find_standalone_result(&id).is_some() {
                            trace!(tool_use_id = %id, "Dropping repeated orphan result");
                            return false;
                        }
                        debug!(tool_use_id = %id, "Result without tool_use, keeping standalone");
                        self.standalone_results
                            .insert(id.clone(), self.messages.len());
                        self.push(message);
                    }
                }

                self.tracker.complete_tool(id, is_error, outcome.as_ref());
                true
            }
            _ => {
                self.push(message);
                true
            }
        }
    }

    fn push(&mut self, message: CanonicalMessage) {
        if let Some(uuid) = &message.uuid {
            self.uuids.insert(uuid.clone());
        }
        self.messages.push(message);
    }

    fn find_tool_use(&self, id: &ToolUseId) -> Option<usize> {
        self.tool_uses.get(id).copied()
    }

    fn find_standalone_result(&self, id: &ToolUseId) -> Option<relay_core::ToolResultPayload> {
        let pos = self.standalone_results.get(id)?;
        match &self.messages.get(*pos)?.kind {
            MessageKind::ToolResult(payload) => Some(payload.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ToolStatus;
    use serde_json::json;

    fn tool_use_delta(id: &str, name: &str) -> Value {
        json!({"tool_use": {"id": id, "name": name, "input": {"command": "ls"}}})
    }

    fn tool_result_delta(id: &str, content: &str) -> Value {
        json!({"tool_result": {"tool_use_id": id, "content": content}})
    }

    #[test]
    fn test_result_merges_into_tool_use() {
        let mut r = EventReconciler::new();
        assert!(r.reconcile_delta(&[tool_use_delta("t1", "Bash")]));
        assert!(r.reconcile_delta(&[tool_result_delta("t1", "Cargo.toml")]));

        assert_eq!(r.messages().len(), 1);
        let msg = &r.messages()[0];
        assert!(msg.is_resolved());
        match &msg.kind {
            MessageKind::ToolUse {
                result, loading, ..
            } => {
                assert!(!loading);
                assert_eq!(result.as_ref().unwrap().content, "Cargo.toml");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }

        let completed: Vec<_> = r.tracker().recent_completed(10).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, ToolStatus::Completed);
        assert_eq!(r.tracker().running_count(), 0);
    }

    #[test]
    fn test_orphan_result_is_appended() {
        let mut r = EventReconciler::new();
        r.reconcile_delta(&[json!({"human": "hi"}), tool_result_delta("t9", "late")]);

        assert_eq!(r.messages().len(), 2);
        assert_eq!(r.messages()[1].kind_label(), "tool_result");
        assert_eq!(r.displayed_messages().len(), 2);
        // Tracker synthesized a placeholder
        assert!(r.tracker().is_known(&ToolUseId::from("t9")));
    }

    #[test]
    fn test_tool_use_adopts_earlier_orphan_result() {
        let mut r = EventReconciler::new();
        r.reconcile_delta(&[tool_result_delta("t2", "done"), tool_use_delta("t2", "Read")]);

        assert_eq!(r.messages().len(), 2);
        assert!(r.messages()[1].is_resolved());

        let displayed = r.displayed_messages();
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].kind_label(), "tool_use");
        assert_eq!(r.tracker().running_count(), 0);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let mut r = EventReconciler::new();
        r.reconcile_delta(&[
            tool_use_delta("t1", "Bash"),
            tool_use_delta("t1", "Bash"),
            tool_result_delta("t1", "first"),
        ]);
        assert!(!r.reconcile_delta(&[tool_result_delta("t1", "second")]));

        assert_eq!(r.messages().len(), 1);
        match &r.messages()[0].kind {
            MessageKind::ToolUse { result, .. } => {
                assert_eq!(result.as_ref().unwrap().content, "first");
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        assert_eq!(r.tracker().total_tool_uses(), 1);
    }

    #[test]
    fn test_repeated_uuid_is_dropped() {
        let mut r = EventReconciler::new();
        let record = json!({"type": "user", "uuid": "u-1", "message": {"content": "hello"}});
        r.reconcile_history(&[record.clone()]);
        assert!(!r.reconcile_delta(&[record]));
        assert_eq!(r.messages().len(), 1);
    }

    #[test]
    fn test_history_replaces_list_and_resets_tracker() {
        let mut r = EventReconciler::new();
        r.reconcile_delta(&[tool_use_delta("old", "Bash"), json!({"human": "stale"})]);
        assert_eq!(r.tracker().running_count(), 1);

        let history = vec![
            json!({"type": "user", "message": {"content": "list files"}}),
            json!({"type": "assistant", "message": {"content": [
                {"type": "text", "text": "Sure"},
                {"type": "tool_use", "id": "h1", "name": "Bash", "input": {"command": "ls"}}
            ]}}),
            json!({"type": "user", "message": {"content": [
                {"type": "tool_result", "tool_use_id": "h1", "content": "src"}
            ]}}),
            json!({"type": "summary", "summary": "ignored"}),
            json!({"type": "assistant", "message": {"content": "All done."}}),
        ];
        let count = r.reconcile_history(&history);

        assert_eq!(count, 3);
        let labels: Vec<_> = r.messages().iter().map(|m| m.kind_label()).collect();
        assert_eq!(labels, vec!["human", "tool_use", "assistant"]);
        assert!(r.messages()[1].is_resolved());
        assert!(!r.tracker().is_known(&ToolUseId::from("old")));
        assert_eq!(r.tracker().running_count(), 0);
        assert_eq!(r.tracker().total_tool_uses(), 1);
    }

    #[test]
    fn test_agent_stats_flow_from_tool_use_result() {
        let mut r = EventReconciler::new();
        r.reconcile_delta(&[
            json!({"tool_use": {"id": "a1", "name": "Task", "input": {
                "subagent_type": "Explore", "description": "Scan repo"
            }}}),
            tool_use_delta("n1", "Grep"),
            json!({
                "type": "user",
                "message": {"content": [{"type": "tool_result", "tool_use_id": "a1", "content": "2k tokens"}]},
                "toolUseResult": {"totalTokens": 5000, "totalToolUseCount": 3}
            }),
        ]);

        let agents: Vec<_> = r.tracker().completed_agents().collect();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].token_count.map(|t| t.as_u64()), Some(5000));
        assert_eq!(agents[0].tool_count, 3);
    }

    #[test]
    fn test_unrecognized_deltas_change_nothing() {
        let mut r = EventReconciler::new();
        assert!(!r.reconcile_delta(&[json!({"noise": true}), json!(null)]));
        assert!(r.messages().is_empty());
    }

    #[test]
    fn test_history_reset_clears_lookup_indexes() {
        let mut r = EventReconciler::new();
        let record = json!({"type": "user", "uuid": "u-1", "message": {"content": "hello"}});
        r.reconcile_delta(&[record.clone(), tool_use_delta("t1", "Bash")]);

        // Replay the same uuid and tool id into a fresh list
        r.reconcile_history(&[record]);
        assert!(r.reconcile_delta(&[tool_use_delta("t1", "Bash")]));
        assert!(r.reconcile_delta(&[tool_result_delta("t1", "ok")]));

        assert_eq!(r.messages().len(), 2);
        assert!(r.messages()[1].is_resolved());
    }

    #[test]
    fn test_long_history_merges_every_result() {
        let mut records = Vec::new();
        for i in 0..500 {
            let id = format!("t{i}");
            records.push(json!({"type": "assistant", "uuid": format!("a{i}"), "message": {"content": [
                {"type": "tool_use", "id": id, "name": "Read", "input": {}}
            ]}}));
            records.push(json!({"type": "user", "uuid": format!("r{i}"), "message": {"content": [
                {"type": "tool_result", "tool_use_id": id, "content": "ok"}
            ]}}));
        }

        let mut r = EventReconciler::new();
        assert_eq!(r.reconcile_history(&records), 500);
        assert!(r.messages().iter().all(CanonicalMessage::is_resolved));
        assert!(!r.reconcile_delta(&records[..2]));
    }
}
