//! Error types for tint-core operations.

use std::path::PathBuf;

/// All errors that can occur in tint-core operations.
///
/// Per-tab failures in the daemon are logged and confined to the tab that
/// raised them; this type mostly surfaces at the edges (hook CLI, startup).
#[derive(Debug, thiserror::Error)]
pub enum TintError {
    #[error("home directory not found")]
    HomeNotFound,

    #[error("invalid working directory: {reason}")]
    InvalidCwd { reason: &'static str },

    #[error("configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
