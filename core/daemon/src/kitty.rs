//! kitty remote-control client.
//!
//! The daemon talks to kitty exclusively through `kitty @`: `ls` for the
//! window/tab/process topology and `set-tab-title` / `set-tab-color` for
//! updates. Every invocation is bounded by a timeout so an unresponsive
//! terminal cannot stall the reconciliation loop.
//!
//! The listen socket under `/tmp` is discovered once and cached; a failed
//! call drops the cache and re-discovers exactly once before the call is
//! given up for this cycle. All errors here are transient by design — the
//! caller retries on the next cycle.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use tint_core::command::ProcessRecord;

const LIST_TIMEOUT: Duration = Duration::from_secs(2);
const APPLY_TIMEOUT: Duration = Duration::from_secs(1);
const SOCKET_DIR: &str = "/tmp";
const SOCKET_PREFIX: &str = "kitty-";

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("kitty subprocess error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kitty did not answer within the timeout")]
    Timeout,

    #[error("kitty command failed: {0}")]
    CommandFailed(String),

    #[error("malformed ls payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One top-level kitty OS window as reported by `kitty @ ls`. Only the
/// fields the reconciler consumes are modeled; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsWindow {
    #[serde(default)]
    pub tabs: Vec<KittyTab>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KittyTab {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_focused: bool,
    #[serde(default)]
    pub windows: Vec<KittyWindow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KittyWindow {
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub foreground_processes: Vec<ForegroundProcess>,
}

/// kitty reports pids as signed integers and may omit fields entirely;
/// everything is optional here and tightened in [`ForegroundProcess::to_record`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForegroundProcess {
    #[serde(default)]
    pub pid: Option<i64>,
    #[serde(default)]
    pub ppid: Option<i64>,
    #[serde(default)]
    pub cmdline: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ForegroundProcess {
    pub fn pid_u32(&self) -> Option<u32> {
        self.pid.and_then(|pid| u32::try_from(pid).ok())
    }

    pub fn to_record(&self) -> Option<ProcessRecord> {
        Some(ProcessRecord {
            pid: self.pid_u32()?,
            ppid: self.ppid.and_then(|ppid| u32::try_from(ppid).ok()),
            cmdline: self.cmdline.clone(),
            cwd: self.cwd.clone(),
        })
    }
}

/// A full topology snapshot, stamped at capture time.
#[derive(Debug, Clone)]
pub struct Topology {
    pub captured_at: DateTime<Utc>,
    pub os_windows: Vec<OsWindow>,
}

/// The external control channel, abstracted so the reconciliation loop can
/// be driven by a fake in tests.
pub trait ControlChannel {
    fn fetch_topology(&mut self) -> Result<Topology, ChannelError>;

    /// Sets both title and color for one tab. A failure affects only this
    /// tab; the caller moves on to the next one.
    fn apply(&mut self, tab_id: u64, title: &str, color: &str) -> Result<(), ChannelError>;
}

/// Production channel shelling out to `kitty @`.
#[derive(Debug, Default)]
pub struct KittyRemoteControl {
    socket: Option<PathBuf>,
}

impl KittyRemoteControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn discover_socket() -> Option<PathBuf> {
        let entries = std::fs::read_dir(SOCKET_DIR).ok()?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(SOCKET_PREFIX))
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    fn command(&mut self) -> Command {
        if self.socket.is_none() {
            self.socket = Self::discover_socket();
            if let Some(socket) = &self.socket {
                debug!(socket = %socket.display(), "kitty control socket discovered");
            }
        }
        let mut cmd = Command::new("kitty");
        cmd.arg("@");
        // Without an explicit socket, `kitty @` relies on the environment's
        // listen configuration; that is kitty's own fallback, keep it.
        if let Some(socket) = &self.socket {
            cmd.arg("--to").arg(format!("unix:{}", socket.display()));
        }
        cmd
    }

    fn run_once(&mut self, args: &[String], timeout: Duration) -> Result<Output, ChannelError> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = run_with_timeout(cmd, timeout)?;
        if !output.status.success() {
            return Err(ChannelError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }

    /// A failure may mean the cached socket went stale (kitty restarted);
    /// drop the cache and try one fresh discovery before giving up.
    fn run_with_retry(&mut self, args: &[String], timeout: Duration) -> Result<Output, ChannelError> {
        match self.run_once(args, timeout) {
            Ok(output) => Ok(output),
            Err(err) => {
                debug!(error = %err, "kitty command failed; re-discovering socket");
                self.socket = None;
                self.run_once(args, timeout)
            }
        }
    }
}

impl ControlChannel for KittyRemoteControl {
    fn fetch_topology(&mut self) -> Result<Topology, ChannelError> {
        let output = self.run_with_retry(&["ls".to_string()], LIST_TIMEOUT)?;
        let os_windows: Vec<OsWindow> = serde_json::from_slice(&output.stdout)?;
        Ok(Topology {
            captured_at: Utc::now(),
            os_windows,
        })
    }

    fn apply(&mut self, tab_id: u64, title: &str, color: &str) -> Result<(), ChannelError> {
        let match_arg = format!("--match=id:{tab_id}");
        self.run_with_retry(
            &[
                "set-tab-title".to_string(),
                match_arg.clone(),
                title.to_string(),
            ],
            APPLY_TIMEOUT,
        )?;
        self.run_with_retry(
            &[
                "set-tab-color".to_string(),
                match_arg,
                format!("active_fg={color}"),
                format!("inactive_fg={color}"),
            ],
            APPLY_TIMEOUT,
        )?;
        Ok(())
    }
}

/// Runs a command with piped stdio and a hard deadline. On expiry the child
/// is killed so it cannot accumulate; the detached reaper thread collects
/// the corpse.
pub(crate) fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
) -> Result<Output, ChannelError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = cmd.spawn()?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(_) => {
            // SAFETY: SIGKILL to a pid we spawned ourselves; if it already
            // exited we get ESRCH, which is harmless.
            unsafe {
                libc::kill(pid as i32, libc::SIGKILL);
            }
            Err(ChannelError::Timeout)
        }
    }
}
