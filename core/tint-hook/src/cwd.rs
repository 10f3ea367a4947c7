//! Hook-file writing for shell precmd/chpwd hooks.
//!
//! Validation happens before anything touches the filesystem: the daemon
//! treats these files as untrusted input, and the writer refuses to
//! produce anything the reader would discard.

use thiserror::Error;

use tint_core::hookfile;
use tint_core::TintError;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("invalid tab id: {0}")]
    InvalidTabId(u64),

    #[error(transparent)]
    Core(#[from] TintError),
}

pub fn run(tab_id: u64, path: &str) -> Result<(), HookError> {
    if tab_id == 0 {
        return Err(HookError::InvalidTabId(tab_id));
    }
    let dir = hookfile::runtime_dir()?;
    let normalized = normalize_path(path);
    hookfile::write_atomic(&dir, tab_id, &normalized)?;
    tracing::debug!(tab_id, path = %normalized, "hook file written");
    Ok(())
}

pub fn cleanup() -> Result<(), HookError> {
    let dir = hookfile::runtime_dir()?;
    let removed = hookfile::sweep(&dir);
    tracing::debug!(removed, "hook files removed");
    Ok(())
}

fn normalize_path(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        path.trim_end_matches('/').to_string()
    }
}
