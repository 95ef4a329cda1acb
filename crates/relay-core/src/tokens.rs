//! Token counts reported for sub-agent runs.

use serde::{Deserialize, Serialize};

/// Tokens consumed by one sub-agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parses an abbreviated count such as `"2"`, `"2k"`, `"1.5m"`.
    ///
    /// The number and the optional `k`/`m` suffix are given separately,
    /// the way they come out of a regex capture. Suffixes are
    /// case-insensitive. Returns `None` for anything unparsable or
    /// negative.
    pub fn from_abbreviated(number: &str, suffix: Option<&str>) -> Option<Self> {
        let value: f64 = number.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let multiplier = match suffix.map(str::to_ascii_lowercase).as_deref() {
            None | Some("") => 1.0,
            Some("k") => 1_000.0,
            Some("m") => 1_000_000.0,
            Some(_) => return None,
        };
        Some(Self((value * multiplier).round() as u64))
    }
}
