//! Core data types for the execution surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitepilot_core_types::Locator;

/// Markup longer than this is truncated before it reaches discovery
/// backends (token budget, matches the original capture pipeline).
pub const MAX_SNAPSHOT_MARKUP: usize = 100_000;

/// Live handle to a located element
///
/// Valid only for the session that produced it; a navigation or
/// re-render invalidates it silently, which is exactly what the
/// verify step exists to catch.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    /// Surface-internal node reference
    pub node_id: String,

    /// Locator this handle was resolved from
    pub locator: Locator,
}

impl ElementHandle {
    pub fn new(node_id: impl Into<String>, locator: Locator) -> Self {
        Self {
            node_id: node_id.into(),
            locator,
        }
    }
}

/// Action to perform against a resolved handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Click/tap the element
    Click,

    /// Focus the element and type text into it
    TypeText { text: String },

    /// Read the element's value (paired with `read`, no mutation)
    Extract,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::TypeText { .. } => "type_text",
            Action::Extract => "extract",
        }
    }

    /// Whether this action only reads page state
    pub fn is_readonly(&self) -> bool {
        matches!(self, Action::Extract)
    }
}

/// Visual + structural capture of the current page state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSnapshot {
    /// Page context this snapshot was taken for
    pub page_context: String,

    /// Cleaned structural markup (scripts/styles stripped, truncated)
    pub markup: String,

    /// Optional PNG screenshot bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_png: Option<Vec<u8>>,

    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl LiveSnapshot {
    /// Build a snapshot, cleaning the raw markup on the way in.
    pub fn new(page_context: impl Into<String>, raw_markup: &str) -> Self {
        Self {
            page_context: page_context.into(),
            markup: clean_markup(raw_markup),
            screenshot_png: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot_png = Some(png);
        self
    }

    /// Check a selector string appears anywhere in the markup.
    /// Cheap structural presence test, not a real CSS match.
    pub fn markup_mentions(&self, needle: &str) -> bool {
        let needle = needle.trim_start_matches(['.', '#']);
        !needle.is_empty() && self.markup.contains(needle)
    }
}

/// Strip script/style blocks and truncate to the token budget
pub fn clean_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_SNAPSHOT_MARKUP));
    let mut rest = raw;
    loop {
        // Whichever block opens first is stripped first
        let (open, tag) = match (find_ci(rest, "<script"), find_ci(rest, "<style")) {
            (Some(s), Some(y)) if y < s => (y, "</style>"),
            (Some(s), _) => (s, "</script>"),
            (None, Some(y)) => (y, "</style>"),
            (None, None) => break,
        };
        out.push_str(&rest[..open]);
        match find_ci(&rest[open..], tag) {
            Some(close) => rest = &rest[open + close + tag.len()..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    if out.len() > MAX_SNAPSHOT_MARKUP {
        // Back off to a char boundary so the cut never splits a
        // multibyte character
        let mut cut = MAX_SNAPSHOT_MARKUP;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}
