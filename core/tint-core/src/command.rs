//! Foreground-command classification.
//!
//! Given the foreground processes kitty reports for a tab, produce a short
//! label describing what the user is actually running ("nvim", "cargo",
//! "script") or nothing at all when only a shell is sitting at a prompt.
//!
//! Interpreter invocations are unwrapped twice over: the per-cycle process
//! table follows single-child parent→child chains (shell wraps interpreter),
//! and the command line of the deepest process is inspected for a script
//! argument (`python3 script.py` surfaces `script`, not `python3`).

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::config::FilterConfig;
use crate::title;

/// Longest interpreter-wrapping chain the walk will follow. Deeper chains
/// are almost certainly a loop in malformed parent-pid data.
const MAX_CHAIN_DEPTH: usize = 8;

/// Processes belonging to the terminal or to tabtint itself; labeling a tab
/// with these would be circular.
static TOOL_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from(["kitty", "kitten", "tabtint-daemon", "tint-hook"])
});

/// Short-lived plumbing that never deserves a tab label.
static SYSTEM_UTILITIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "sleep", "wait", "cat", "echo", "true", "false", "test", "grep", "sed", "awk", "tail",
        "head",
    ])
});

/// Interpreter families and the script extensions they run.
static INTERPRETERS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("node", &["js", "mjs", "cjs"] as &[&str]),
        ("python", &["py"]),
        ("ruby", &["rb"]),
        ("perl", &["pl"]),
        ("php", &["php"]),
    ])
});

/// Script names too generic to be useful as a label; the interpreter name
/// is more informative than `main`.
static GENERIC_SCRIPT_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from(["index", "main", "app", "cli", "bin", "start", "run"])
});

/// One process as observed in a topology snapshot. `ppid` is optional
/// because the control channel does not guarantee it; records without it
/// simply contribute no parent→child edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub cmdline: Vec<String>,
    pub cwd: Option<String>,
}

/// Per-cycle index of the snapshot's processes, keyed by pid with a
/// pid → children map for chain walking. Built once per reconciliation
/// cycle; never queries the live OS.
#[derive(Debug, Default)]
pub struct ProcessTable {
    records: HashMap<u32, ProcessRecord>,
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessTable {
    pub fn from_records(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            // The same process can appear under several windows; first
            // observation wins.
            if table.records.contains_key(&record.pid) {
                continue;
            }
            if let Some(ppid) = record.ppid {
                table.children.entry(ppid).or_default().push(record.pid);
            }
            table.records.insert(record.pid, record);
        }
        table
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    /// Follows single-child links from `root` until the chain ends, forks,
    /// or the depth bound is hit. A process with several children is a job
    /// controller, not a wrapper, so the walk stops there.
    pub fn deepest_single_chain(&self, root: u32) -> u32 {
        let mut current = root;
        for _ in 0..MAX_CHAIN_DEPTH {
            match self.children.get(&current) {
                Some(kids) if kids.len() == 1 => current = kids[0],
                _ => break,
            }
        }
        current
    }
}

/// Outcome of classifying one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The process should not be surfaced in the tab title.
    Suppressed,
    /// A display label; `priority` marks user-facing commands that win over
    /// whatever else the tab is running.
    Label { text: String, priority: bool },
}

/// Classifies a single command line against the filter configuration.
///
/// Filter order: tool names, ignored shells, system utilities, ignored
/// commands, ignored prefixes, ignored suffixes. Explicit suppression is
/// conservative: a name on both an ignore list and the priority list is
/// suppressed.
pub fn classify(cmdline: &[String], filters: &FilterConfig) -> Verdict {
    let Some(first) = cmdline.first() else {
        return Verdict::Suppressed;
    };

    let mut name = base_name(first).to_string();
    // Login shells report themselves as "-zsh".
    if let Some(stripped) = name.strip_prefix('-') {
        name = stripped.to_string();
    }
    if name.is_empty() {
        return Verdict::Suppressed;
    }

    let lowered = name.to_lowercase();
    if TOOL_COMMANDS.contains(lowered.as_str()) {
        return Verdict::Suppressed;
    }
    if filters.ignored_shells.iter().any(|s| s.to_lowercase() == lowered) {
        return Verdict::Suppressed;
    }
    if SYSTEM_UTILITIES.contains(lowered.as_str()) {
        return Verdict::Suppressed;
    }
    if filters.ignored_commands.iter().any(|c| c.to_lowercase() == lowered) {
        return Verdict::Suppressed;
    }
    if filters
        .ignored_prefixes
        .iter()
        .any(|p| lowered.starts_with(&p.to_lowercase()))
    {
        return Verdict::Suppressed;
    }
    if filters
        .ignored_suffixes
        .iter()
        .any(|s| lowered.ends_with(&s.to_lowercase()))
    {
        return Verdict::Suppressed;
    }

    if let Some(script) = unwrap_interpreter(&lowered, cmdline) {
        name = script;
    }

    let final_lowered = name.to_lowercase();
    let priority = filters
        .priority_commands
        .iter()
        .any(|p| p.to_lowercase() == final_lowered);
    Verdict::Label { text: name, priority }
}

/// Resolves the display label for a tab given the root foreground pids of
/// its window, in report order. Each root is walked to its deepest
/// single-chain descendant before classification; the first priority label
/// wins, otherwise the first label at all.
pub fn resolve_label(
    table: &ProcessTable,
    roots: &[u32],
    filters: &FilterConfig,
    max_len: usize,
) -> Option<String> {
    let mut first: Option<String> = None;
    for &root in roots {
        let deepest = table.deepest_single_chain(root);
        let Some(record) = table.get(deepest) else {
            continue;
        };
        match classify(&record.cmdline, filters) {
            Verdict::Label { text, priority } => {
                if priority {
                    return Some(title::truncate(&text, max_len));
                }
                if first.is_none() {
                    first = Some(text);
                }
            }
            Verdict::Suppressed => {}
        }
    }
    first.map(|text| title::truncate(&text, max_len))
}

fn base_name(command: &str) -> &str {
    command.rsplit('/').next().unwrap_or(command)
}

/// Strips a trailing version suffix for interpreter-table matching:
/// `python3.11` matches the `python` family.
fn interpreter_family(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
}

/// When `name` is a known interpreter, picks the first plausible script
/// argument and returns its base name with the family's extension removed.
/// Generic script names fall through so the interpreter name stays.
fn unwrap_interpreter(name: &str, cmdline: &[String]) -> Option<String> {
    let extensions = INTERPRETERS.get(interpreter_family(name))?;
    for arg in cmdline.iter().skip(1) {
        if arg.starts_with('-') {
            continue;
        }
        if matches!(arg.as_str(), "/" | "." | "..") {
            continue;
        }
        let mut script = base_name(arg).to_string();
        for ext in *extensions {
            if let Some(stripped) = script.strip_suffix(&format!(".{ext}")) {
                script = stripped.to_string();
                break;
            }
        }
        if script.is_empty() || GENERIC_SCRIPT_NAMES.contains(script.to_lowercase().as_str()) {
            continue;
        }
        return Some(script);
    }
    None
}
