//! Incremental region between two terminal captures.
//!
//! Captures are compared by line count: whatever `current` has beyond the
//! number of lines in `previous` is the new output. This only holds while
//! the pane grows monotonically; a redraw or scroll breaks it. `DiffMode::Strict`
//! checks that `previous` is really a prefix of `current` and falls back to
//! the whole capture when it is not.

use serde::{Deserialize, Serialize};

/// How snapshot deltas are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Suffix past the previous line count, no content check.
    #[default]
    LineCount,
    /// Verify the prefix; return the full capture when it was rewritten.
    Strict,
}

/// Relationship between two consecutive captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotDelta {
    /// No new lines.
    Unchanged,
    /// `previous` is a prefix of `current`; holds the appended lines.
    Grew(String),
    /// The earlier lines changed, so the pane was redrawn or scrolled.
    Rewritten,
}

/// Computes the new region of a capture relative to the previous one.
///
/// Returns an empty string when the captures are identical or `current`
/// has no lines beyond `previous`'s count.
pub fn diff_snapshots(previous: &str, current: &str) -> String {
    if previous == current {
        return String::new();
    }
    let prev_count = previous.lines().count();
    current
        .lines()
        .skip(prev_count)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stateless differ parameterised by [`DiffMode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputDiffer {
    mode: DiffMode,
}

impl OutputDiffer {
    #[must_use]
    pub fn new(mode: DiffMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> DiffMode {
        self.mode
    }

    /// Checks whether `current` extends `previous` line by line.
    pub fn classify(&self, previous: &str, current: &str) -> SnapshotDelta {
        let prev: Vec<&str> = previous.lines().collect();
        let cur: Vec<&str> = current.lines().collect();

        let Some(head) = cur.get(..prev.len()) else {
            return SnapshotDelta::Rewritten;
        };
        if head != prev.as_slice() {
            return SnapshotDelta::Rewritten;
        }
        let tail = cur.get(prev.len()..).unwrap_or_default();
        if tail.is_empty() {
            SnapshotDelta::Unchanged
        } else {
            SnapshotDelta::Grew(tail.join("\n"))
        }
    }

    /// New output according to the configured mode.
    pub fn diff(&self, previous: &str, current: &str) -> String {
        match self.mode {
            DiffMode::LineCount => diff_snapshots(previous, current),
            DiffMode::Strict => match self.classify(previous, current) {
                SnapshotDelta::Unchanged => String::new(),
                SnapshotDelta::Grew(added) => added,
                SnapshotDelta::Rewritten => {
                    tracing::debug!(
                        previous_lines = previous.lines().count(),
                        current_lines = current.lines().count(),
                        "Capture no longer extends previous snapshot, using full capture"
                    );
                    current.to_string()
                }
            },
        }
    }
}
