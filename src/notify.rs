//! Cross-platform native desktop notifications
//!
//! Two backends sit behind `NotificationBackend`:
//! - `OsascriptBackend`: `display notification` via AppleScript (macOS)
//! - `NativeBackend`: notify-rust (macOS notification center, libnotify on
//!   Linux/BSD, toast on Windows)
//!
//! `Notifier` wraps a backend and drops repeats of the same message.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify_rust::Notification;
use tokio::process::Command;

use crate::config::NotificationSystem;
use crate::errors::{NotifierError, Result};

/// Identical messages inside this window are delivered once
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Prune stale debounce entries once the map grows past this
const DEBOUNCE_PRUNE_AT: usize = 64;

/// What to show
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    pub timeout_ms: u32,
    pub icon: Option<PathBuf>,
    /// Suppress the OS notification sound (we play our own)
    pub silent: bool,
}

/// A way of putting a notification on screen
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, request: &NotificationRequest) -> Result<()>;
}

/// Pick the backend once at startup
pub fn backend_for(system: NotificationSystem) -> Arc<dyn NotificationBackend> {
    if cfg!(target_os = "macos") && system == NotificationSystem::Osascript {
        Arc::new(OsascriptBackend)
    } else {
        Arc::new(NativeBackend)
    }
}

/// Quote a string as an AppleScript literal
fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `osascript -e 'display notification ...'`
pub struct OsascriptBackend;

impl OsascriptBackend {
    fn script(request: &NotificationRequest) -> String {
        let mut script = format!(
            "display notification {} with title {}",
            applescript_string(&request.message),
            applescript_string(&request.title)
        );
        if !request.silent {
            script.push_str(" sound name \"default\"");
        }
        script
    }
}

#[async_trait]
impl NotificationBackend for OsascriptBackend {
    fn name(&self) -> &'static str {
        "osascript"
    }

    async fn send(&self, request: &NotificationRequest) -> Result<()> {
        let output = Command::new("osascript")
            .args(["-e", &Self::script(request)])
            .output()
            .await?;

        if !output.status.success() {
            return Err(NotifierError::command_failed("osascript", output.status));
        }
        Ok(())
    }
}

/// notify-rust backend
pub struct NativeBackend;

#[async_trait]
impl NotificationBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn send(&self, request: &NotificationRequest) -> Result<()> {
        let request = request.clone();

        // show() blocks on D-Bus / NSUserNotification round trips
        tokio::task::spawn_blocking(move || {
            let mut notification = Notification::new();
            notification
                .summary(&request.title)
                .body(&request.message)
                .timeout(i32::try_from(request.timeout_ms).unwrap_or(i32::MAX));

            if let Some(icon) = request.icon.as_ref().and_then(|p| p.to_str()) {
                notification.icon(icon);
            }
            if !request.silent {
                notification.sound_name("default");
            }

            notification
                .show()
                .map(|_| ())
                .map_err(|e| NotifierError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| NotifierError::Backend(format!("notification task failed: {e}")))?
    }
}

/// Debounced front end to a `NotificationBackend`
pub struct Notifier {
    backend: Arc<dyn NotificationBackend>,
    /// message text -> last delivery
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl Notifier {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            backend,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Record a delivery at `now` unless the same key was delivered within
    /// the debounce window
    fn claim(&self, key: &str, now: Instant) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = last_sent.get(key) {
            if now.saturating_duration_since(*previous) < DEBOUNCE_WINDOW {
                return false;
            }
        }

        if last_sent.len() >= DEBOUNCE_PRUNE_AT {
            last_sent.retain(|_, sent| now.saturating_duration_since(*sent) < DEBOUNCE_WINDOW);
        }

        last_sent.insert(key.to_string(), now);
        true
    }

    /// Send unless debounced; returns whether the backend was called
    pub async fn send(&self, request: &NotificationRequest) -> Result<bool> {
        self.send_at(request, Instant::now()).await
    }

    async fn send_at(&self, request: &NotificationRequest, now: Instant) -> Result<bool> {
        if !self.claim(&request.message, now) {
            tracing::debug!(message = %request.message, "Notification debounced");
            return Ok(false);
        }

        self.backend.send(request).await?;
        tracing::debug!(
            backend = self.backend.name(),
            title = %request.title,
            "Notification sent"
        );
        Ok(true)
    }
}
