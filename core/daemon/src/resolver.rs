//! Working-directory resolution.
//!
//! A tab's directory can come from three places, in strict priority order:
//!
//! 1. the hook file shell integration writes on every `cd` (instant and
//!    accurate, but optional),
//! 2. the foreground process's working directory as the OS reports it
//!    (universal, but costs a lookup and can race a fast `cd`),
//! 3. the directory the control channel itself reports (always present,
//!    but only refreshed by kitty at window creation).
//!
//! Each tier is a named strategy returning `Some(path)` or "not
//! applicable"; the first hit wins and the reported tier cannot miss, so
//! resolution never fails.

use std::path::PathBuf;

use tint_core::hookfile;

/// Which strategy produced a resolved directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdTier {
    HookFile,
    Process,
    Reported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCwd {
    pub path: String,
    pub tier: CwdTier,
}

#[derive(Debug)]
pub struct CwdResolver {
    hook_dir: Option<PathBuf>,
}

impl CwdResolver {
    /// `hook_dir` is `None` when the runtime directory could not be set up;
    /// the hook tier is then skipped entirely.
    pub fn new(hook_dir: Option<PathBuf>) -> Self {
        Self { hook_dir }
    }

    pub fn resolve(&self, tab_id: u64, foreground_pid: Option<u32>, reported: &str) -> ResolvedCwd {
        if let Some(dir) = &self.hook_dir {
            if let Some(path) = hookfile::read_validated(dir, tab_id) {
                return ResolvedCwd {
                    path,
                    tier: CwdTier::HookFile,
                };
            }
        }

        if let Some(pid) = foreground_pid {
            if let Some(path) = process_cwd(pid) {
                return ResolvedCwd {
                    path,
                    tier: CwdTier::Process,
                };
            }
        }

        ResolvedCwd {
            path: reported.to_string(),
            tier: CwdTier::Reported,
        }
    }
}

/// The OS's answer for a process's working directory. Missing processes,
/// permission errors, and non-absolute results all read as "not
/// applicable".
#[cfg(target_os = "linux")]
pub fn process_cwd(pid: u32) -> Option<String> {
    let link = std::fs::read_link(format!("/proc/{pid}/cwd")).ok()?;
    let path = link.to_str()?.to_string();
    path.starts_with('/').then_some(path)
}

#[cfg(target_os = "macos")]
pub fn process_cwd(pid: u32) -> Option<String> {
    use std::process::Command;
    use std::time::Duration;

    let mut cmd = Command::new("lsof");
    cmd.args(["-a", "-p", &pid.to_string(), "-d", "cwd", "-F", "n"]);
    let output = crate::kitty::run_with_timeout(cmd, Duration::from_secs(1)).ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|path| path.starts_with('/'))
        .map(str::to_string)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn process_cwd(_pid: u32) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_tier_wins_over_reported() {
        let dir = tempfile::tempdir().unwrap();
        hookfile::write_atomic(dir.path(), 7, "/a/b").unwrap();
        let resolver = CwdResolver::new(Some(dir.path().to_path_buf()));
        let resolved = resolver.resolve(7, None, "/x/y");
        assert_eq!(resolved.path, "/a/b");
        assert_eq!(resolved.tier, CwdTier::HookFile);
    }

    #[test]
    fn untrusted_hook_file_falls_through() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        hookfile::write_atomic(dir.path(), 7, "/a/b").unwrap();
        let path = hookfile::cwd_file_path(dir.path(), 7);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let resolver = CwdResolver::new(Some(dir.path().to_path_buf()));
        let resolved = resolver.resolve(7, None, "/x/y");
        assert_eq!(resolved.path, "/x/y");
        assert_eq!(resolved.tier, CwdTier::Reported);
    }

    #[test]
    fn missing_hook_dir_skips_straight_to_fallbacks() {
        let resolver = CwdResolver::new(None);
        let resolved = resolver.resolve(1, None, "/fallback");
        assert_eq!(resolved.path, "/fallback");
        assert_eq!(resolved.tier, CwdTier::Reported);
    }

    #[test]
    fn reported_tier_terminates_even_when_empty() {
        let resolver = CwdResolver::new(None);
        let resolved = resolver.resolve(1, None, "");
        assert_eq!(resolved.path, "");
        assert_eq!(resolved.tier, CwdTier::Reported);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn process_tier_reads_our_own_cwd() {
        let own = std::env::current_dir().unwrap();
        let resolver = CwdResolver::new(None);
        let resolved = resolver.resolve(1, Some(std::process::id()), "/fallback");
        assert_eq!(resolved.tier, CwdTier::Process);
        assert_eq!(resolved.path, own.to_string_lossy());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn dead_pid_falls_through_to_reported() {
        // No real process can hold this pid; the kernel caps pid_max below it.
        let resolver = CwdResolver::new(None);
        let resolved = resolver.resolve(1, Some(u32::MAX), "/fallback");
        assert_eq!(resolved.tier, CwdTier::Reported);
    }
}
