// Clippy configuration: enable pedantic but allow overly strict lints
#![allow(clippy::missing_errors_doc)] // Internal functions don't need # Errors docs
#![allow(clippy::missing_panics_doc)] // Internal functions don't need # Panics docs
#![allow(clippy::must_use_candidate)] // Not all getters need #[must_use]
#![allow(clippy::module_name_repetitions)] // e.g., NotifierConfig in config module is fine
#![allow(clippy::doc_markdown)] // Don't require backticks around macOS, JSON, etc.
#![allow(clippy::struct_excessive_bools)] // Config and report structs carry several flags
#![allow(clippy::cast_possible_truncation)] // Timeout seconds -> milliseconds is clamped
#![allow(clippy::cast_sign_loss)] // Timeouts are validated positive
#![allow(clippy::cast_precision_loss)] // Millisecond deltas fit comfortably in f64
#![allow(clippy::float_cmp)] // Config defaults are exact literals
#![allow(clippy::redundant_closure_for_method_calls)] // Sometimes closures are clearer
#![allow(clippy::if_not_else)] // Negative conditions can be clearer for early returns
#![allow(clippy::single_match_else)] // match with else is fine for Result handling
#![allow(clippy::items_after_statements)] // Helper consts can be defined inline

//! agent-notifier - desktop notifications for coding-agent sessions
//!
//! Plays a sound and/or shows an OS notification when an agent needs
//! permission, finishes, fails, or asks a question.
//!
//! Usage:
//!   agent-notifier hook            # Handle one event piped on stdin
//!   agent-notifier serve           # Long-running mode fed over a Unix socket
//!   agent-notifier sound toggle    # Flip the persisted sound setting

mod cli;
mod command;
mod config;
mod dispatch;
mod errors;
mod event;
mod focus;
mod host;
mod notify;
mod sound;
mod sound_toggle;

use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use color_eyre::Result;
use config::NotifierConfig;
use dispatch::Dispatcher;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("/tmp/agent-notifier/logs"),
        |dirs| dirs.cache_dir().join("agent-notifier").join("logs"),
    )
}

/// File logging with daily rotation; stderr if the log directory is unusable.
/// Stdout is never used so hook output stays clean.
fn init_logging(log_level: &str) -> Option<WorkerGuard> {
    let log_filter = format!("agent_notifier={log_level}");
    let log_dir = get_log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(&log_filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
        tracing::warn!("Log directory {:?} unavailable ({}), logging to stderr", log_dir, e);
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "agent-notifier.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    Some(guard)
}

/// Handle one host event from stdin
///
/// Silently succeeds if:
/// - No stdin input (empty hook call)
/// - Input is not a recognizable event
/// - Any notification, sound, or command fails
async fn handle_hook(socket_path: &Path) -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    if input.trim().is_empty() {
        return Ok(()); // Silent exit - no input
    }

    let value: serde_json::Value = match serde_json::from_str(&input) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                error = %e,
                input_len = input.len(),
                "Invalid event JSON from host (check hook configuration)"
            );
            return Ok(());
        }
    };

    // A running server owns the debounce state; let it handle the event
    #[cfg(unix)]
    {
        if event::socket::forward(socket_path, &value).await {
            tracing::debug!("Event forwarded to server");
            return Ok(());
        }
    }
    #[cfg(not(unix))]
    let _ = socket_path;

    let host_event = match event::HostEvent::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Unrecognized event shape from host");
            return Ok(());
        }
    };

    let dispatcher = Dispatcher::from_system(NotifierConfig::load());
    let host = host::SnapshotHost::new(host_event.sessions.clone());
    if let Some(report) = dispatcher.handle(&host_event, &host).await {
        tracing::debug!(
            event = %report.event,
            acted = report.acted(),
            suppressed = report.suppressed,
            "Hook handled"
        );
    }
    Ok(())
}

/// Long-running mode: one config load, one debounce map, events from the socket
#[cfg(unix)]
async fn serve(socket_path: &Path) -> Result<()> {
    let config = NotifierConfig::load();
    tracing::info!(
        "Loaded config: sound = {}, notification = {}, suppress_when_focused = {}",
        config.sound,
        config.notification,
        config.suppress_when_focused
    );

    let dispatcher = Arc::new(Dispatcher::from_system(config));
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    event::socket::listen(dispatcher, socket_path, cancel).await
}

#[cfg(not(unix))]
async fn serve(_socket_path: &Path) -> Result<()> {
    color_eyre::eyre::bail!("serve needs Unix domain sockets; use `hook` on this platform")
}

fn handle_sound(action: &str, json: bool) -> Result<ExitCode> {
    let path = NotifierConfig::default_path();
    let result = sound_toggle::run_named(action, &path);

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else if result.success {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_config(action: ConfigAction) -> Result<()> {
    let path = NotifierConfig::default_path();
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let config = NotifierConfig::load_from_path(&path);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    let _guard = init_logging(&cli.log_level);
    tracing::debug!("agent-notifier v{} ({:?})", env!("CARGO_PKG_VERSION"), cli.command);

    match cli.command {
        Commands::Hook => handle_hook(&cli.socket).await?,
        Commands::Serve => serve(&cli.socket).await?,
        Commands::Sound { action, json } => return handle_sound(&action, json),
        Commands::Config { action } => handle_config(action)?,
        Commands::Completions { shell } => cli::print_completions(shell),
    }

    Ok(ExitCode::SUCCESS)
}
