//! Structured error types for agent-notifier
//!
//! Uses thiserror for ergonomic error definitions with automatic Display
//! and Error trait implementations.

use std::path::PathBuf;

use thiserror::Error;

/// All possible errors in agent-notifier
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Filesystem, socket, or process spawn error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sound toggle requires an existing config file
    #[error("Config file not found at {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Sound toggle received an action it does not know
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// External program exited unsuccessfully
    #[error("'{program}' exited with {status}")]
    CommandFailed { program: String, status: String },

    /// Notification, sound, or focus backend unavailable or failed
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenience Result type using NotifierError
pub type Result<T> = std::result::Result<T, NotifierError>;

impl NotifierError {
    /// Build a `CommandFailed` from a finished process status
    pub fn command_failed(program: &str, status: std::process::ExitStatus) -> Self {
        NotifierError::CommandFailed {
            program: program.to_string(),
            status: status.to_string(),
        }
    }
}
