//! tint-hook: shell-integration helper for tabtint.
//!
//! Called by shell precmd/chpwd hooks to publish a tab's working directory
//! where the daemon can read it. The shell spawns this in the background;
//! it must stay fast and must never disrupt the prompt.
//!
//! ## Subcommands
//!
//! - `cwd`: write the hook file for one tab (called on every `cd`)
//! - `cleanup`: remove all hook files (uninstall hygiene)

mod cwd;
mod logging;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tint-hook")]
#[command(about = "Shell integration for tabtint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the shell's current working directory for a tab
    Cwd {
        /// kitty tab id
        #[arg(value_name = "TAB_ID")]
        tab_id: u64,

        /// Absolute path to the current working directory
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Remove all hook files written by shell integration
    Cleanup,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Cwd { tab_id, path } => {
            if let Err(e) = cwd::run(tab_id, &path) {
                tracing::warn!(error = %e, "tint-hook cwd failed");
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Cleanup => {
            if let Err(e) = cwd::cleanup() {
                tracing::warn!(error = %e, "tint-hook cleanup failed");
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}
