//! Event dispatcher: host event -> EventType -> notification, sound, command
//!
//! Everything here is best effort. A failed notification, sound, or command
//! is logged and never surfaces to the host.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::process::Command;

use crate::command::{CommandLauncher, CommandRunner, ProcessLauncher};
use crate::config::{self, NotifierConfig};
use crate::event::{EventType, HostEvent, HostEventKind};
use crate::focus::{FocusDetector, OsFocusDetector};
use crate::host::HostClient;
use crate::notify::{self, NotificationBackend, NotificationRequest, Notifier};
use crate::sound::{SoundBackend, SoundPlayer, SystemPlayer};

/// Notification title; the project name is appended when enabled
pub const APP_TITLE: &str = "Agent Notifier";

/// What a single dispatch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub event: EventType,
    /// Notification reached the backend
    pub notified: bool,
    /// Notification skipped because the terminal had focus
    pub suppressed: bool,
    pub sound_played: bool,
    pub command_launched: bool,
}

impl DispatchReport {
    /// At least one side effect happened
    pub fn acted(&self) -> bool {
        self.notified || self.sound_played || self.command_launched
    }
}

/// Owns the configuration and every side-effect collaborator
pub struct Dispatcher {
    config: NotifierConfig,
    install_dir: PathBuf,
    notifier: Notifier,
    sound: SoundPlayer,
    command: CommandRunner,
    focus: Arc<dyn FocusDetector>,
}

impl Dispatcher {
    pub fn new(
        config: NotifierConfig,
        install_dir: PathBuf,
        notification_backend: Arc<dyn NotificationBackend>,
        sound_backend: Arc<dyn SoundBackend>,
        launcher: Arc<dyn CommandLauncher>,
        focus: Arc<dyn FocusDetector>,
    ) -> Self {
        Self {
            notifier: Notifier::new(notification_backend),
            sound: SoundPlayer::new(sound_backend, &install_dir),
            command: CommandRunner::new(launcher),
            config,
            install_dir,
            focus,
        }
    }

    /// Real OS backends, selected once for this platform
    pub fn from_system(config: NotifierConfig) -> Self {
        let backend = notify::backend_for(config.notification_system);
        tracing::debug!(backend = backend.name(), "Notification backend selected");

        Self::new(
            config,
            config::install_dir(),
            backend,
            Arc::new(SystemPlayer),
            Arc::new(ProcessLauncher),
            Arc::new(OsFocusDetector::detect()),
        )
    }

    /// Handle one host event; `None` when the event is not one we react to
    pub async fn handle(&self, event: &HostEvent, host: &dyn HostClient) -> Option<DispatchReport> {
        let event_type = match &event.kind {
            HostEventKind::PermissionRequested => EventType::Permission,
            HostEventKind::SessionIdle => {
                self.idle_event_type(event.session_id.as_deref(), host)
                    .await
            }
            HostEventKind::SubagentIdle => EventType::SubagentComplete,
            HostEventKind::SessionError => EventType::Error,
            HostEventKind::QuestionAsked => EventType::Question,
            HostEventKind::Other(name) => {
                tracing::debug!(event = %name, "Ignoring host event");
                return None;
            }
        };

        let project = if self.config.show_project_name {
            project_name(event.directory.as_deref()).await
        } else {
            None
        };

        let elapsed = if self.config.command.enabled && self.config.command.min_duration > 0.0 {
            elapsed_since_last_user_message(event.session_id.as_deref(), host).await
        } else {
            None
        };

        Some(self.dispatch(event_type, project.as_deref(), elapsed).await)
    }

    /// Root sessions complete; child sessions are subagents
    async fn idle_event_type(&self, session_id: Option<&str>, host: &dyn HostClient) -> EventType {
        let Some(session_id) = session_id else {
            return EventType::Complete;
        };

        match host.parent_session(session_id).await {
            Ok(Some(parent)) => {
                tracing::debug!(session = %session_id, parent = %parent, "Idle session is a subagent");
                EventType::SubagentComplete
            }
            Ok(None) => EventType::Complete,
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "Parent lookup failed");
                EventType::Complete
            }
        }
    }

    fn title(&self, project: Option<&str>) -> String {
        match project {
            Some(project) if self.config.show_project_name && !project.is_empty() => {
                format!("{APP_TITLE} ({project})")
            }
            _ => APP_TITLE.to_string(),
        }
    }

    /// Fire notification, sound, and command for a resolved event
    ///
    /// Notification and sound are awaited together and settle independently.
    /// The command is launched and not awaited. Focus suppression only
    /// affects the notification.
    pub async fn dispatch(
        &self,
        event: EventType,
        project: Option<&str>,
        elapsed_secs: Option<f64>,
    ) -> DispatchReport {
        let notification_enabled = self.config.is_event_notification_enabled(event);
        let sound_enabled = self.config.is_event_sound_enabled(event);
        let message = self.config.message(event);

        let notification = async {
            if !notification_enabled {
                return (false, false);
            }
            if self.config.suppress_when_focused && self.focus.is_terminal_focused().await {
                tracing::debug!(event = %event, "Terminal focused, notification suppressed");
                return (false, true);
            }

            let request = NotificationRequest {
                title: self.title(project),
                message: message.to_string(),
                timeout_ms: self.config.timeout_ms(),
                icon: self.config.icon_path(&self.install_dir),
                silent: sound_enabled,
            };
            match self.notifier.send(&request).await {
                Ok(sent) => (sent, false),
                Err(e) => {
                    tracing::warn!(event = %event, error = %e, "Notification failed");
                    (false, false)
                }
            }
        };

        let sound = async {
            if !sound_enabled {
                return false;
            }
            match self.sound.play(event, self.config.sound_path(event)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(event = %event, error = %e, "Sound failed");
                    false
                }
            }
        };

        let command_launched = self.command.run(&self.config.command, event, message, elapsed_secs);

        let ((notified, suppressed), sound_played) = tokio::join!(notification, sound);

        tracing::info!(
            event = %event,
            notified,
            suppressed,
            sound_played,
            command_launched,
            "Event dispatched"
        );

        DispatchReport {
            event,
            notified,
            suppressed,
            sound_played,
            command_launched,
        }
    }
}

/// Seconds since the session's last user message, when the host knows it
async fn elapsed_since_last_user_message(
    session_id: Option<&str>,
    host: &dyn HostClient,
) -> Option<f64> {
    let session_id = session_id?;
    match host.last_user_message_at(session_id).await {
        Ok(Some(at)) => Some((Utc::now() - at).num_milliseconds() as f64 / 1000.0),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(session = %session_id, error = %e, "Message lookup failed");
            None
        }
    }
}

/// Project name from the event directory, CLAUDE_PROJECT_DIR, git repo, or current directory
pub async fn project_name(directory: Option<&str>) -> Option<String> {
    let basename = |dir: &str| {
        Path::new(dir)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    };

    if let Some(name) = directory.and_then(basename) {
        return Some(name);
    }

    if let Some(name) = std::env::var("CLAUDE_PROJECT_DIR")
        .ok()
        .as_deref()
        .and_then(basename)
    {
        return Some(name);
    }

    // Fall back to git
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .await
    {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                if let Some(name) = basename(path.trim()) {
                    return Some(name);
                }
            }
        }
    }

    // Fall back to current directory name
    std::env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
}
