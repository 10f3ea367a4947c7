//! Hook files published by shell integration.
//!
//! On every directory change the shell hook writes one small file per tab
//! (`tab_<id>_cwd`) containing the tab's current working directory. The
//! daemon reads these as its fastest and most accurate directory source.
//!
//! The files live in a per-user runtime directory and are written by a
//! different process than the one reading them, so reads distrust
//! everything: ownership, permission bits, content shape. A file failing
//! any check is ignored (logged at debug) and the daemon falls back to its
//! other directory sources.
//!
//! Writes go through a temp file plus rename so a concurrent read never
//! observes partial content.

use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing::debug;

use crate::error::TintError;

/// Upper bound on hook-file content; anything longer is not a real path.
pub const MAX_PATH_BYTES: usize = 4096;

const FILE_PREFIX: &str = "tab_";
const FILE_SUFFIX: &str = "_cwd";

/// Per-user runtime directory for hook files and the daemon lockfile.
///
/// `$XDG_RUNTIME_DIR/tabtint` when available (cleaned up on logout),
/// otherwise `~/.cache/tabtint`. Created `0700`; permissions are re-applied
/// on an existing directory.
pub fn runtime_dir() -> Result<PathBuf, TintError> {
    let dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(value) if !value.is_empty() => PathBuf::from(value).join("tabtint"),
        _ => dirs::cache_dir().ok_or(TintError::HomeNotFound)?.join("tabtint"),
    };
    fs::create_dir_all(&dir)?;
    fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    Ok(dir)
}

pub fn cwd_file_path(dir: &Path, tab_id: u64) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{tab_id}{FILE_SUFFIX}"))
}

/// Structural validation shared by the writer and the reader: absolute,
/// bounded, no traversal sequences, no control characters.
pub fn validate_cwd(cwd: &str) -> Result<(), TintError> {
    if cwd.is_empty() {
        return Err(TintError::InvalidCwd {
            reason: "empty path",
        });
    }
    if !cwd.starts_with('/') {
        return Err(TintError::InvalidCwd {
            reason: "path is not absolute",
        });
    }
    if cwd.len() > MAX_PATH_BYTES {
        return Err(TintError::InvalidCwd {
            reason: "path too long",
        });
    }
    if cwd.split('/').any(|component| component == "..") {
        return Err(TintError::InvalidCwd {
            reason: "path traversal not allowed",
        });
    }
    if cwd.chars().any(char::is_control) {
        return Err(TintError::InvalidCwd {
            reason: "control characters in path",
        });
    }
    Ok(())
}

/// Atomically publishes `cwd` for `tab_id`. The temp file is created with
/// owner-only permissions and renamed into place.
pub fn write_atomic(dir: &Path, tab_id: u64, cwd: &str) -> Result<(), TintError> {
    validate_cwd(cwd)?;
    let target = cwd_file_path(dir, tab_id);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(cwd.as_bytes())?;
    tmp.persist(&target).map_err(|err| TintError::Io(err.error))?;
    Ok(())
}

/// Reads and validates the hook file for `tab_id`. Any failure returns
/// `None` so the caller falls through to the next directory source.
pub fn read_validated(dir: &Path, tab_id: u64) -> Option<String> {
    let path = cwd_file_path(dir, tab_id);
    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(_) => return None,
    };
    if !metadata.is_file() {
        debug!(path = %path.display(), "hook file is not a regular file");
        return None;
    }
    // getuid is always safe to call.
    let uid = unsafe { libc::getuid() };
    if metadata.uid() != uid {
        debug!(path = %path.display(), "hook file not owned by current user");
        return None;
    }
    if metadata.permissions().mode() & 0o077 != 0 {
        debug!(path = %path.display(), "hook file readable by group or others");
        return None;
    }

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "failed to read hook file");
            return None;
        }
    };
    let cwd = raw.trim();
    if let Err(err) = validate_cwd(cwd) {
        debug!(path = %path.display(), error = %err, "hook file content rejected");
        return None;
    }
    Some(cwd.to_string())
}

/// Removes every hook file in `dir`. Returns how many were removed;
/// failures are logged and skipped.
pub fn sweep(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => debug!(error = %err, "failed to remove hook file"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), 7, "/home/user/project").unwrap();
        assert_eq!(
            read_validated(dir.path(), 7).as_deref(),
            Some("/home/user/project")
        );
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), 3, "/a/b").unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tab_3_cwd".to_string()]);
    }

    #[test]
    fn written_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), 5, "/a/b").unwrap();
        let mode = std::fs::metadata(cwd_file_path(dir.path(), 5))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn validation_rejects_bad_paths() {
        assert!(validate_cwd("").is_err());
        assert!(validate_cwd("relative/path").is_err());
        assert!(validate_cwd("/a/../etc/passwd").is_err());
        assert!(validate_cwd("/a/b\n/c").is_err());
        assert!(validate_cwd(&format!("/{}", "x".repeat(MAX_PATH_BYTES))).is_err());
        assert!(validate_cwd("/a/..b/c").is_ok());
        assert!(validate_cwd("/a/b.c").is_ok());
    }

    #[test]
    fn write_rejects_invalid_cwd() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_atomic(dir.path(), 1, "relative").is_err());
        assert!(read_validated(dir.path(), 1).is_none());
    }

    #[test]
    fn world_readable_file_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), 9, "/a/b").unwrap();
        let path = cwd_file_path(dir.path(), 9);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(read_validated(dir.path(), 9).is_none());
    }

    #[test]
    fn tampered_content_is_rejected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = cwd_file_path(dir.path(), 4);
        std::fs::write(&path, "/a/../../etc").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(read_validated(dir.path(), 4).is_none());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_validated(dir.path(), 42).is_none());
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = cwd_file_path(dir.path(), 6);
        std::fs::write(&path, "/home/user\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert_eq!(read_validated(dir.path(), 6).as_deref(), Some("/home/user"));
    }

    #[test]
    fn sweep_removes_only_hook_files() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), 1, "/a").unwrap();
        write_atomic(dir.path(), 2, "/b").unwrap();
        std::fs::write(dir.path().join("daemon.pid"), "123").unwrap();
        assert_eq!(sweep(dir.path()), 2);
        assert!(dir.path().join("daemon.pid").exists());
        assert!(read_validated(dir.path(), 1).is_none());
    }
}
