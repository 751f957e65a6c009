//! Enable, disable, toggle, or report the persisted `sound` flag

use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::config::NotifierConfig;
use crate::errors::NotifierError;

/// Actions accepted by `agent-notifier sound <action>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundAction {
    Enable,
    Disable,
    Toggle,
    Status,
}

impl FromStr for SoundAction {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "toggle" => Ok(Self::Toggle),
            "status" => Ok(Self::Status),
            other => Err(NotifierError::UnknownAction(other.to_string())),
        }
    }
}

/// Outcome shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,
}

impl ToggleResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            sound_enabled: None,
        }
    }

    fn ok(message: &str, sound_enabled: bool) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            sound_enabled: Some(sound_enabled),
        }
    }
}

fn not_found(path: &Path) -> ToggleResult {
    ToggleResult::failure(format!(
        "{}. Create it first (e.g. `{{}}`) to manage sound settings.",
        NotifierError::ConfigNotFound(path.to_path_buf())
    ))
}

/// Run a sound action given as a string (CLI argument or tool call)
pub fn run_named(action: &str, path: &Path) -> ToggleResult {
    match action.parse::<SoundAction>() {
        Ok(SoundAction::Enable) => enable_sound(path),
        Ok(SoundAction::Disable) => disable_sound(path),
        Ok(SoundAction::Toggle) => toggle_sound(path),
        Ok(SoundAction::Status) => sound_status(path),
        Err(e) => ToggleResult::failure(format!(
            "{e}. Use enable, disable, toggle, or status."
        )),
    }
}

/// Run a sound action against the config file at `path`
fn run(action: SoundAction, path: &Path) -> ToggleResult {
    if !path.exists() {
        return not_found(path);
    }

    let mut config = NotifierConfig::load_from_path(path);

    let enabled = match action {
        SoundAction::Status => {
            let message = if config.sound {
                "Sound is enabled"
            } else {
                "Sound is disabled"
            };
            return ToggleResult::ok(message, config.sound);
        }
        SoundAction::Enable => true,
        SoundAction::Disable => false,
        SoundAction::Toggle => !config.sound,
    };

    config.set_global_sound(enabled);
    if let Err(e) = config.save_to_path(path) {
        tracing::warn!(error = %e, "Failed to save sound setting");
        return ToggleResult::failure(format!("Failed to save config: {e}"));
    }

    tracing::info!(sound = enabled, ?action, "Sound setting changed");
    ToggleResult::ok(
        if enabled {
            "Sound enabled"
        } else {
            "Sound disabled"
        },
        enabled,
    )
}

pub fn enable_sound(path: &Path) -> ToggleResult {
    run(SoundAction::Enable, path)
}

pub fn disable_sound(path: &Path) -> ToggleResult {
    run(SoundAction::Disable, path)
}

pub fn toggle_sound(path: &Path) -> ToggleResult {
    run(SoundAction::Toggle, path)
}

pub fn sound_status(path: &Path) -> ToggleResult {
    run(SoundAction::Status, path)
}
