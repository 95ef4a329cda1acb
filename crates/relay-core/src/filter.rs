//! Terminal output cleanup.
//!
//! Turns a raw tmux capture of the Claude Code UI into presentable
//! paragraphs plus the "context left until auto-compact" percentage.
//!
//! The pass is line-oriented and order-dependent: once the auto-compact
//! marker line is seen, that line and every line after it are dropped.
//! The marker sits in the footer below the prompt box, so everything
//! after it is status chrome.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Substring identifying the context-remaining footer line.
pub const AUTO_COMPACT_MARKER: &str = "auto-compact";

/// Label that replaces the `>` prompt prefix on echoed user input.
pub const HUMAN_LABEL: &str = "**You:**";

/// Lines shorter than this (after trimming) are treated as noise.
const MIN_LINE_CHARS: usize = 3;

static PERCENT_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d{1,3})\s*%").ok());

/// Cleaned terminal output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredOutput {
    /// Kept lines, separated by blank lines
    pub content: String,
    /// Context remaining (0-100) when the auto-compact marker was present
    pub context_percent: Option<u8>,
}

impl FilteredOutput {
    /// True when there is neither content nor a context signal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.context_percent.is_none()
    }
}

/// Filters a raw capture.
pub fn filter_output(raw: &str) -> FilteredOutput {
    let mut kept: Vec<String> = Vec::new();
    let mut context_percent = None;

    for line in raw.lines() {
        if line.contains(AUTO_COMPACT_MARKER) {
            context_percent = extract_percent(line);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || is_box_only(trimmed) || is_boxed(trimmed) {
            continue;
        }

        if let Some(said) = trimmed.strip_prefix('>') {
            kept.push(format!("{HUMAN_LABEL} {}", said.trim()));
            continue;
        }

        if trimmed.chars().count() < MIN_LINE_CHARS {
            continue;
        }

        kept.push(line.to_string());
    }

    FilteredOutput {
        content: kept.join("\n\n").trim().to_string(),
        context_percent,
    }
}

/// Box-drawing block (U+2500..U+257F).
fn is_box_char(c: char) -> bool {
    ('\u{2500}'..='\u{257F}').contains(&c)
}

fn is_box_only(trimmed: &str) -> bool {
    trimmed.chars().all(is_box_char)
}

/// Starts and ends with box-drawing runs, e.g. `│ > ls │`.
fn is_boxed(trimmed: &str) -> bool {
    let starts = trimmed.chars().next().is_some_and(is_box_char);
    let ends = trimmed.chars().next_back().is_some_and(is_box_char);
    starts && ends
}

/// Last percentage on the line, if it is a valid 0-100 value.
fn extract_percent(line: &str) -> Option<u8> {
    let regex = PERCENT_REGEX.as_ref()?;
    let caps = regex.captures_iter(line).last()?;
    let value: u8 = caps.get(1)?.as_str().parse().ok()?;
    (value <= 100).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_and_blank_lines_yield_nothing() {
        let raw = "╭──────────╮\n\n   \n│          │\n╰──────────╯\n────────";
        let out = filter_output(raw);
        assert_eq!(out.content, "");
        assert_eq!(out.context_percent, None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_context_marker_extracts_percent_and_stops() {
        let raw = "Listing files now\nContext left until auto-compact: 42%\nsecret tail line\nanother";
        let out = filter_output(raw);
        assert_eq!(out.context_percent, Some(42));
        assert_eq!(out.content, "Listing files now");
        assert!(!out.content.contains("secret"));
    }

    #[test]
    fn test_marker_at_top_suppresses_everything() {
        let raw = "Context left until auto-compact: 7%\nreal content below\nmore content";
        let out = filter_output(raw);
        assert_eq!(out.context_percent, Some(7));
        assert_eq!(out.content, "");
    }

    #[test]
    fn test_marker_without_percent_still_stops() {
        let raw = "before\nauto-compact soon\nafter";
        let out = filter_output(raw);
        assert_eq!(out.context_percent, None);
        assert_eq!(out.content, "before");
    }

    #[test]
    fn test_prompt_line_is_relabelled() {
        let out = filter_output("> hello");
        assert_eq!(out.content, "**You:** hello");
    }

    #[test]
    fn test_boxed_prompt_echo_is_dropped() {
        let raw = "╭────────────╮\n│ > ls       │\n╰────────────╯\nCargo.toml\nsrc";
        let out = filter_output(raw);
        assert_eq!(out.content, "Cargo.toml\n\nsrc");
    }

    #[test]
    fn test_short_lines_are_noise() {
        let out = filter_output("ok\n?\nlonger line");
        assert_eq!(out.content, "longer line");
    }

    #[test]
    fn test_kept_lines_are_verbatim_and_paragraph_joined() {
        let out = filter_output("  indented line\nsecond line");
        assert_eq!(out.content, "indented line\n\nsecond line");

        let out = filter_output("first\n    nested detail");
        assert_eq!(out.content, "first\n\n    nested detail");
    }

    #[test]
    fn test_out_of_range_percent_is_ignored() {
        let out = filter_output("Context left until auto-compact: 140%");
        assert_eq!(out.context_percent, None);
    }
}
