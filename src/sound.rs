//! Audio cues per event, played through the platform's command-line player
//!
//! - macOS: `afplay`
//! - Linux/BSD: `paplay`, then `aplay`
//! - Windows: `Media.SoundPlayer` via PowerShell

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{NotifierError, Result};
use crate::event::EventType;

/// Plays a sound file to completion
#[async_trait]
pub trait SoundBackend: Send + Sync {
    async fn play(&self, path: &Path) -> Result<()>;
}

/// Shells out to whichever audio utility the OS ships
pub struct SystemPlayer;

impl SystemPlayer {
    /// Candidate (program, args) pairs, tried in order
    fn candidates(path: &Path) -> Vec<(&'static str, Vec<String>)> {
        let file = path.to_string_lossy().into_owned();

        if cfg!(target_os = "macos") {
            vec![("afplay", vec![file])]
        } else if cfg!(target_os = "windows") {
            let script = format!(
                "(New-Object Media.SoundPlayer '{}').PlaySync()",
                file.replace('\'', "''")
            );
            vec![(
                "powershell",
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    script,
                ],
            )]
        } else {
            vec![
                ("paplay", vec![file.clone()]),
                ("aplay", vec!["-q".to_string(), file]),
            ]
        }
    }
}

#[async_trait]
impl SoundBackend for SystemPlayer {
    async fn play(&self, path: &Path) -> Result<()> {
        let mut last_error = NotifierError::Backend("no audio player available".to_string());

        for (program, args) in Self::candidates(path) {
            match Command::new(program).args(&args).output().await {
                Ok(output) if output.status.success() => {
                    tracing::debug!(player = program, path = %path.display(), "Played sound");
                    return Ok(());
                }
                Ok(output) => {
                    last_error = NotifierError::command_failed(program, output.status);
                }
                Err(e) => {
                    tracing::debug!(player = program, error = %e, "Audio player unavailable");
                    last_error = e.into();
                }
            }
        }

        Err(last_error)
    }
}

/// macOS system sound used when no bundled file exists
fn macos_system_sound(event: EventType) -> PathBuf {
    let name = match event {
        EventType::Permission => "Glass",
        EventType::Complete => "Hero",
        EventType::SubagentComplete => "Pop",
        EventType::Error => "Basso",
        EventType::Question => "Purr",
    };
    PathBuf::from(format!("/System/Library/Sounds/{name}.aiff"))
}

/// Expand a leading `~/` against the user's home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolves which file to play for an event and plays it
pub struct SoundPlayer {
    backend: Arc<dyn SoundBackend>,
    /// Bundled `<event>.wav` files
    sounds_dir: PathBuf,
}

impl SoundPlayer {
    pub fn new(backend: Arc<dyn SoundBackend>, install_dir: &Path) -> Self {
        Self {
            backend,
            sounds_dir: install_dir.join("sounds"),
        }
    }

    /// Custom path if configured, else the bundled file, else (macOS) a system sound
    pub fn resolve(&self, event: EventType, custom: Option<&str>) -> Option<PathBuf> {
        if let Some(custom) = custom {
            return Some(expand_home(custom));
        }

        let bundled = self.sounds_dir.join(format!("{}.wav", event.as_str()));
        if bundled.is_file() {
            return Some(bundled);
        }

        if cfg!(target_os = "macos") {
            let system = macos_system_sound(event);
            if system.is_file() {
                return Some(system);
            }
        }
        None
    }

    pub async fn play(&self, event: EventType, custom: Option<&str>) -> Result<()> {
        let path = self.resolve(event, custom).ok_or_else(|| {
            NotifierError::Backend(format!("no sound file available for {event}"))
        })?;
        self.backend.play(&path).await
    }
}
