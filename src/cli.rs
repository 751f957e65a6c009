//! CLI argument parsing
//!
//! Uses clap for argument parsing with derive macros.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

/// Get default socket path, preferring XDG_RUNTIME_DIR on Linux
fn default_socket_path() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (Linux best practice)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("agent-notifier.sock");
    }
    // Fall back to /tmp (macOS and fallback)
    PathBuf::from("/tmp/agent-notifier.sock")
}

/// Desktop notifications and sound cues for coding-agent lifecycle events
#[derive(Parser, Debug)]
#[command(name = "agent-notifier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Socket shared by `serve` and `hook` (default: $XDG_RUNTIME_DIR/agent-notifier.sock or /tmp/agent-notifier.sock)
    #[arg(
        short,
        long,
        env = "AGENT_NOTIFIER_SOCKET",
        default_value_os_t = default_socket_path(),
        global = true
    )]
    pub socket: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process one host event JSON from stdin
    ///
    /// Forwards to a running `serve` process when its socket exists,
    /// otherwise notifies directly.
    Hook,

    /// Keep configuration and debounce state alive, reading events from the socket
    Serve,

    /// Manage the persisted sound setting
    Sound {
        /// enable, disable, toggle, or status
        action: String,

        /// Print the result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the resolved configuration as JSON
    Show,
}

/// Generate shell completions and print to stdout
pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "agent-notifier", &mut io::stdout());
}
