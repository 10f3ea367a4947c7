//! Single-instance lockfile.
//!
//! At most one daemon runs per user session. The lock is a file holding a
//! decimal PID; acquiring it means either no file exists, or the recorded
//! process is gone (or its PID was recycled by an unrelated process). A
//! live, matching holder makes the second instance exit cleanly without
//! side effects.
//!
//! The lock is an owned resource: dropping a [`DaemonLock`] removes the
//! file, but only while it still holds our own PID.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use fs_err as fs;
use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("daemon already running (pid {0})")]
    AlreadyRunning(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    pid: u32,
}

impl DaemonLock {
    pub fn acquire(path: PathBuf) -> Result<Self, LockError> {
        Self::acquire_with(path, std::process::id(), holder_is_live)
    }

    /// Acquisition with an injectable liveness check so stale-lock handling
    /// is testable without real daemons.
    fn acquire_with(
        path: PathBuf,
        own_pid: u32,
        is_live: impl Fn(u32) -> bool,
    ) -> Result<Self, LockError> {
        match fs::read_to_string(&path) {
            Ok(raw) => {
                match raw.trim().parse::<u32>() {
                    Ok(pid) if pid != own_pid && is_live(pid) => {
                        return Err(LockError::AlreadyRunning(pid));
                    }
                    Ok(pid) => debug!(pid, "removing stale lockfile"),
                    Err(_) => debug!("removing malformed lockfile"),
                }
                fs::remove_file(&path)?;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        fs::write(&path, format!("{own_pid}\n"))?;
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(Self { path, pid: own_pid })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let still_ours = fs::read_to_string(&self.path)
            .map(|raw| raw.trim().parse::<u32>() == Ok(self.pid))
            .unwrap_or(false);
        if !still_ours {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(error = %err, "failed to remove daemon lockfile");
        }
    }
}

/// PIDs get recycled: the recorded process must both answer signal 0 and
/// still look like a tabtint daemon to count as a live holder.
fn holder_is_live(pid: u32) -> bool {
    // SAFETY: kill with signal 0 only checks for existence; it delivers
    // nothing. A dead pid answers ESRCH.
    if unsafe { libc::kill(pid as i32, 0) } != 0 {
        return false;
    }
    process_name_matches(pid)
}

fn process_name_matches(pid: u32) -> bool {
    let mut sys = System::new();
    let sys_pid = Pid::from(pid as usize);
    sys.refresh_process_specifics(sys_pid, ProcessRefreshKind::new());
    sys.process(sys_pid)
        .map(|process| process.name().contains("tabtint"))
        .unwrap_or(false)
}
