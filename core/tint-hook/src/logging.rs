//! File-backed debug logging for the hook binary.
//!
//! The hook runs from shell prompts, so nothing may reach stdout or
//! stderr on the happy path; traces go to a debug log instead. Any failure
//! setting this up silently disables logging rather than breaking the
//! shell.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub fn init() -> Option<WorkerGuard> {
    let dir = dirs::state_dir()
        .or_else(dirs::cache_dir)?
        .join("tabtint");
    fs_err::create_dir_all(&dir).ok()?;

    let appender = tracing_appender::rolling::never(dir, "hook-debug.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}
