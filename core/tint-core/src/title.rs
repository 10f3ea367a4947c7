//! Tab title composition and the last-applied cache.
//!
//! Everything the daemon sends to the terminal passes through here: the
//! directory display name, the optional `[command]` suffix, the active-tab
//! marker, and the sanitization that keeps control characters out of title
//! strings. `TitleCache` remembers what was last written per tab so a cycle
//! that changes nothing issues no writes at all.

use std::collections::{HashMap, HashSet};

/// Marker appended when a label or directory name is cut.
const TRUNCATION_MARKER: &str = "...";

/// Hard ceiling on a rendered title, applied after composition.
const MAX_TITLE_CHARS: usize = 256;

/// Trailing-slash normalization. The root path stays `/`; everything else
/// loses trailing slashes so `/a/b` and `/a/b/` render (and hash)
/// identically.
pub fn normalize_cwd(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// Cuts `text` to at most `max_len` characters, appending the truncation
/// marker when anything was removed.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(TRUNCATION_MARKER.chars().count());
    let cut: String = text.chars().take(keep).collect();
    format!("{cut}{TRUNCATION_MARKER}")
}

/// Removes control characters (including newlines and escape sequences) and
/// caps the overall length. Titles travel through a command-line interface
/// to the terminal; a stray escape byte would corrupt the tab bar.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title.chars().filter(|c| !c.is_control()).collect();
    truncate(&cleaned, MAX_TITLE_CHARS)
}

/// The directory portion of a title: last path component, truncated.
pub fn display_dir(cwd: &str, max_len: usize) -> String {
    let normalized = normalize_cwd(cwd);
    let name = if normalized == "/" {
        "/"
    } else {
        normalized.rsplit('/').next().unwrap_or(normalized)
    };
    truncate(name, max_len)
}

/// Assembles the visible title: `[marker ][index: ]dir[ [command]]`.
pub fn compose_title(
    index: Option<usize>,
    dir: &str,
    command: Option<&str>,
    active_marker: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(marker) = active_marker {
        if !marker.is_empty() {
            out.push_str(marker);
            out.push(' ');
        }
    }
    if let Some(index) = index {
        out.push_str(&index.to_string());
        out.push_str(": ");
    }
    out.push_str(dir);
    if let Some(command) = command {
        out.push_str(" [");
        out.push_str(command);
        out.push(']');
    }
    sanitize_title(&out)
}

/// Last successfully applied title and color for one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTab {
    pub title: String,
    pub color: String,
}

/// Remembers the last-applied rendered state per tab so redundant writes
/// are suppressed. Entries are recorded only after a write succeeds and
/// evicted once the tab disappears from the topology.
#[derive(Debug, Default)]
pub struct TitleCache {
    entries: HashMap<u64, RenderedTab>,
}

impl TitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the candidate differs from the last recorded state for
    /// this tab, or no state has been recorded yet.
    pub fn should_apply(&self, tab_id: u64, title: &str, color: &str) -> bool {
        match self.entries.get(&tab_id) {
            Some(entry) => entry.title != title || entry.color != color,
            None => true,
        }
    }

    pub fn record(&mut self, tab_id: u64, title: String, color: String) {
        self.entries.insert(tab_id, RenderedTab { title, color });
    }

    /// Drops entries for tabs absent from the latest topology.
    pub fn evict_absent(&mut self, live: &HashSet<u64>) {
        self.entries.retain(|tab_id, _| live.contains(tab_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
