//! Paginator caption parsing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `2 of 7`, `(2 de 7)`, `Página 2 / 7`.
#[allow(clippy::expect_used)]
static CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:of|de|/)\s*(\d+)").expect("valid paginator caption regex")
});

/// Current and total page counters read from the paginator caption.
///
/// Always recomputed from the caption, never advanced locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    /// One-based current page.
    pub current: u32,
    pub total: u32,
}

impl PaginationInfo {
    /// Parses a caption; returns `None` when it holds no page counters.
    #[must_use]
    pub fn parse(caption: &str) -> Option<Self> {
        let caps = CAPTION.captures(caption)?;
        let current = caps[1].parse().ok()?;
        let total: u32 = caps[2].parse().ok()?;
        // An empty table renders "(1 of 0)".
        Some(Self {
            current,
            total: total.max(1),
        })
    }

    /// Whether pages remain after the current one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current < self.total
    }
}
