//! Configuration loading.
//!
//! TOML at `~/.config/tabtint/config.toml`, deserialized with per-field
//! defaults so a partial file only overrides what it names. A malformed or
//! unreadable file is not fatal: the daemon logs a warning and runs with
//! defaults rather than refusing to start over a typo.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::TintError;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub colors: ColorConfig,
    pub behavior: BehaviorConfig,
    pub active_tab: ActiveTabConfig,
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    /// Ordered palette of hex colors tabs are assigned from.
    pub palette: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorConfig {
    pub show_commands: bool,
    pub show_tab_index: bool,
    /// Poll interval while tabs are changing.
    pub active_poll_interval_secs: u64,
    /// Poll interval once the session has gone quiet.
    pub idle_poll_interval_secs: u64,
    /// Consecutive no-change cycles before switching to the idle interval.
    pub idle_threshold: u32,
    pub max_dir_length: usize,
    pub max_cmd_length: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActiveTabConfig {
    /// Prefix shown on the focused tab's title.
    pub marker: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub ignored_shells: Vec<String>,
    pub ignored_commands: Vec<String>,
    pub ignored_prefixes: Vec<String>,
    pub ignored_suffixes: Vec<String>,
    pub priority_commands: Vec<String>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            palette: [
                "#2b8eff", "#a9dc76", "#ab9df2", "#ffd866", "#78dce8", "#f48771", "#ff6188",
                "#fc9867", "#79dac8", "#5ad4e6", "#9ecd6f", "#e0af68", "#bb9af7", "#7dcfff",
                "#ff9e64", "#7aa2f7",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            show_commands: true,
            show_tab_index: true,
            active_poll_interval_secs: 2,
            idle_poll_interval_secs: 8,
            idle_threshold: 3,
            max_dir_length: 30,
            max_cmd_length: 30,
        }
    }
}

impl Default for ActiveTabConfig {
    fn default() -> Self {
        Self {
            marker: "▶".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            ignored_shells: list(&["zsh", "bash", "sh", "fish", "ksh", "tcsh", "csh"]),
            ignored_commands: list(&[
                "npm", "yarn", "sleep", "cat", "grep", "sed", "awk", "pip", "gem",
            ]),
            ignored_prefixes: list(&[
                "mcp_server_",
                "helper-",
                "worker-",
                "node_modules",
                "ts-node",
            ]),
            ignored_suffixes: list(&["-helper", "-worker", "-daemon", "-service", "-server"]),
            priority_commands: list(&[
                "nvim", "vim", "vi", "emacs", "code", "nano", "claude", "git", "docker",
                "kubectl",
            ]),
        }
    }
}

impl Config {
    /// Default configuration file location.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("tabtint").join("config.toml"))
    }

    /// Loads from the default location, falling back to defaults when the
    /// file is missing, unreadable, or malformed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("home directory not found; using default configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match fs_err::read_to_string(path) {
            Ok(raw) => match Self::parse(&raw, path) {
                Ok(config) => config,
                Err(err) => {
                    warn!(error = %err, "malformed configuration; using defaults");
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file; using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, "failed to read configuration; using defaults");
                Self::default()
            }
        }
    }

    /// Parses and normalizes a configuration document.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, TintError> {
        let config: Config = toml::from_str(raw).map_err(|err| TintError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        Ok(config.normalized())
    }

    /// An empty palette would make color derivation divide by zero; restore
    /// the default palette and keep everything else the user set.
    fn normalized(mut self) -> Self {
        if self.colors.palette.is_empty() {
            warn!("configured palette is empty; restoring the default palette");
            self.colors = ColorConfig::default();
        }
        self
    }
}
