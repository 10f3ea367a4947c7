//! tabtint daemon entrypoint.
//!
//! A small single-worker service: acquire the single-instance lock, then
//! poll kitty on an adaptive interval and reconcile every tab's title and
//! color against its working directory and foreground command. SIGTERM and
//! SIGINT finish the in-flight cycle before the process exits.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use fs_err as fs;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use tint_core::config::Config;
use tint_core::hookfile;

mod backoff;
mod kitty;
mod lock;
mod reconcile;
mod resolver;

use kitty::KittyRemoteControl;
use lock::{DaemonLock, LockError};
use reconcile::Reconciler;
use resolver::CwdResolver;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "tabtint-daemon")]
#[command(about = "Keeps kitty tab titles and colors in sync with each tab's directory and activity")]
#[command(version)]
struct Cli {
    /// Run a single reconciliation cycle and exit (no lock, no loop)
    #[arg(long)]
    once: bool,

    /// Force debug-level logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.debug);

    let config = Config::load();
    let runtime_dir = match hookfile::runtime_dir() {
        Ok(dir) => Some(dir),
        Err(err) => {
            warn!(error = %err, "runtime directory unavailable; hook files disabled");
            None
        }
    };

    let resolver = CwdResolver::new(runtime_dir.clone());
    let mut reconciler = Reconciler::new(KittyRemoteControl::new(), config, resolver);

    if cli.once {
        let changes = reconciler.cycle(&SHUTDOWN);
        info!(changes, "single cycle finished");
        return ExitCode::SUCCESS;
    }

    let Some(runtime_dir) = runtime_dir else {
        error!("cannot run as a daemon without a runtime directory");
        return ExitCode::FAILURE;
    };

    let _lock = match DaemonLock::acquire(runtime_dir.join("daemon.pid")) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning(pid)) => {
            info!(pid, "another daemon instance is running; exiting");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            error!(error = %err, "failed to acquire daemon lockfile");
            return ExitCode::FAILURE;
        }
    };

    install_signal_handlers();
    info!(version = env!("CARGO_PKG_VERSION"), "tabtint daemon started");

    reconciler.run(&SHUTDOWN);

    let removed = hookfile::sweep(&runtime_dir);
    debug!(removed, "hook files swept on shutdown");
    info!("daemon shut down cleanly");
    ExitCode::SUCCESS
}

/// Stderr logging with an env-driven filter, plus an append-only file log
/// when the state directory is writable. An unwritable log location
/// degrades to stderr-only; it never fails the daemon.
fn init_logging(force_debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let debug_enabled = force_debug
        || std::env::var("TABTINT_DEBUG_LOG")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let appender = log_dir().and_then(|dir| {
        fs::create_dir_all(&dir).ok()?;
        Some(tracing_appender::rolling::never(dir, "daemon.log"))
    });

    match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer.and(std::io::stderr))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn log_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("tabtint"))
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    // SAFETY: installing a handler that only stores to an atomic; both
    // signal numbers are valid.
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

/// Signal handlers may only do async-signal-safe work: set the flag, no
/// logging, no allocation. The loop reads it between tabs and cycles.
extern "C" fn handle_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
