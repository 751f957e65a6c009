//! Notifier configuration: JSON file, defaults, and per-event lookups
//!
//! The file is lenient. Every field is optional, wrong-typed values fall back
//! to their default, and unknown keys are ignored. Per-event flags resolve
//! with a fixed precedence: `events.<name>` first, then the legacy top-level
//! `<name>` key, then the global `sound`/`notification` flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::errors::Result;
use crate::event::EventType;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "AGENT_NOTIFIER_CONFIG";

/// Environment variable overriding the installation directory (icon, sounds)
pub const HOME_ENV: &str = "AGENT_NOTIFIER_HOME";

/// Default notification timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Icon location relative to the installation directory
const ICON_RELATIVE_PATH: &str = "assets/icon.png";

/// Sound and notification switches for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventConfig {
    pub sound: bool,
    pub notification: bool,
}

/// Per-event flags the user wrote explicitly in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventOverride {
    pub sound: Option<bool>,
    pub notification: Option<bool>,
}

impl EventOverride {
    fn apply(self, defaults: EventConfig) -> EventConfig {
        EventConfig {
            sound: self.sound.unwrap_or(defaults.sound),
            notification: self.notification.unwrap_or(defaults.notification),
        }
    }
}

/// Which macOS notification mechanism to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSystem {
    /// `osascript -e 'display notification ...'`
    #[default]
    Osascript,
    /// notify-rust (native notification center)
    Native,
}

impl NotificationSystem {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "osascript" => Some(Self::Osascript),
            "native" | "node-notifier" => Some(Self::Native),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Osascript => "osascript",
            Self::Native => "native",
        }
    }
}

/// Optional external command run after an event
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    pub enabled: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Minimum seconds since the last user message; 0 disables gating
    pub min_duration: f64,
}

impl CommandConfig {
    fn from_json(value: Option<&Value>) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return Self::default();
        };

        let args = obj.get("args").and_then(Value::as_array).and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
        });

        Self {
            enabled: bool_field(obj, "enabled").unwrap_or(false),
            path: obj
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            args,
            min_duration: positive_number(obj.get("minDuration")).unwrap_or(0.0),
        }
    }

    fn to_json(&self) -> Option<Value> {
        let mut out = Map::new();
        if self.enabled {
            out.insert("enabled".into(), json!(true));
        }
        if !self.path.is_empty() {
            out.insert("path".into(), json!(self.path));
        }
        if let Some(args) = &self.args {
            out.insert("args".into(), json!(args));
        }
        if self.min_duration > 0.0 {
            out.insert("minDuration".into(), json!(self.min_duration));
        }
        (!out.is_empty()).then_some(Value::Object(out))
    }
}

/// Fully resolved notifier configuration
///
/// Every `EventType` has an entry in `events`, `messages` and `sounds`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    pub sound: bool,
    pub notification: bool,
    /// Notification timeout in seconds
    pub timeout: f64,
    pub show_project_name: bool,
    pub show_icon: bool,
    pub notification_system: NotificationSystem,
    /// Skip the notification while the agent's terminal has focus
    pub suppress_when_focused: bool,
    pub command: CommandConfig,
    pub events: BTreeMap<EventType, EventConfig>,
    pub messages: BTreeMap<EventType, String>,
    pub sounds: BTreeMap<EventType, Option<String>>,
    /// Explicit per-event entries, kept through global flag changes
    #[serde(skip)]
    pub overrides: BTreeMap<EventType, EventOverride>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self::from_json(&Value::Object(Map::new()))
    }
}

/// Built-in message text for an event
pub fn default_message(event: EventType) -> &'static str {
    match event {
        EventType::Permission => "Session needs permission",
        EventType::Complete => "Session has finished",
        EventType::SubagentComplete => "Subagent task completed",
        EventType::Error => "Session encountered an error",
        EventType::Question => "Session has a question",
    }
}

/// Flags an event gets when the user did not override it
pub fn default_event_config(event: EventType, sound: bool, notification: bool) -> EventConfig {
    match event {
        // Opt-in: subagents finish often and would be noisy
        EventType::SubagentComplete => EventConfig {
            sound: false,
            notification: false,
        },
        _ => EventConfig {
            sound,
            notification,
        },
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

/// Accept only finite numbers greater than zero
fn positive_number(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n > 0.0)
}

/// Read a boolean shorthand or partial object.
/// Returns `None` when the value has neither shape.
fn event_override(value: &Value) -> Option<EventOverride> {
    match value {
        Value::Bool(enabled) => Some(EventOverride {
            sound: Some(*enabled),
            notification: Some(*enabled),
        }),
        Value::Object(obj) => Some(EventOverride {
            sound: bool_field(obj, "sound"),
            notification: bool_field(obj, "notification"),
        }),
        _ => None,
    }
}

impl NotifierConfig {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(&Self::default_path())
    }

    /// `$AGENT_NOTIFIER_CONFIG`, else `<config dir>/agent-notifier/config.json`
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from("~/.config/agent-notifier/config.json"),
            |dirs| dirs.config_dir().join("agent-notifier").join("config.json"),
        )
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(value) if value.is_object() => {
                    tracing::debug!("Loaded configuration from {:?}", path);
                    Self::from_json(&value)
                }
                Ok(_) => {
                    tracing::warn!("Config file {:?} is not a JSON object, using defaults", path);
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Resolve a parsed JSON document against the defaults
    pub fn from_json(value: &Value) -> Self {
        let empty = Map::new();
        let obj = value.as_object().unwrap_or(&empty);

        let sound = bool_field(obj, "sound").unwrap_or(true);
        let notification = bool_field(obj, "notification").unwrap_or(true);

        let nested_events = obj.get("events").and_then(Value::as_object);
        let messages_obj = obj.get("messages").and_then(Value::as_object);
        let sounds_obj = obj.get("sounds").and_then(Value::as_object);

        let mut events = BTreeMap::new();
        let mut messages = BTreeMap::new();
        let mut sounds = BTreeMap::new();
        let mut overrides = BTreeMap::new();

        for event in EventType::ALL {
            let key = event.as_str();
            let defaults = default_event_config(event, sound, notification);

            // Nested wins over legacy when both are present
            let explicit = nested_events
                .and_then(|events| events.get(key))
                .and_then(event_override)
                .or_else(|| obj.get(key).and_then(event_override));
            if let Some(explicit) = explicit {
                overrides.insert(event, explicit);
            }
            events.insert(event, explicit.unwrap_or_default().apply(defaults));

            let message = messages_obj
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .unwrap_or(default_message(event));
            messages.insert(event, message.to_string());

            let custom_sound = sounds_obj
                .and_then(|s| s.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);
            sounds.insert(event, custom_sound);
        }

        Self {
            sound,
            notification,
            timeout: positive_number(obj.get("timeout")).unwrap_or(DEFAULT_TIMEOUT_SECS),
            show_project_name: bool_field(obj, "showProjectName").unwrap_or(true),
            show_icon: bool_field(obj, "showIcon").unwrap_or(true),
            notification_system: obj
                .get("notificationSystem")
                .and_then(Value::as_str)
                .and_then(NotificationSystem::parse)
                .unwrap_or_default(),
            suppress_when_focused: bool_field(obj, "suppressWhenFocused").unwrap_or(false),
            command: CommandConfig::from_json(obj.get("command")),
            events,
            messages,
            sounds,
            overrides,
        }
    }

    /// Serialize only what differs from the defaults
    ///
    /// The global `sound` and `notification` flags are always written, and so
    /// is every per-event flag that was explicit in the loaded file.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("sound".into(), json!(self.sound));
        out.insert("notification".into(), json!(self.notification));

        if self.timeout != DEFAULT_TIMEOUT_SECS {
            out.insert("timeout".into(), json!(self.timeout));
        }
        if !self.show_project_name {
            out.insert("showProjectName".into(), json!(false));
        }
        if !self.show_icon {
            out.insert("showIcon".into(), json!(false));
        }
        if self.notification_system != NotificationSystem::default() {
            out.insert(
                "notificationSystem".into(),
                json!(self.notification_system.as_str()),
            );
        }
        if self.suppress_when_focused {
            out.insert("suppressWhenFocused".into(), json!(true));
        }
        if let Some(command) = self.command.to_json() {
            out.insert("command".into(), command);
        }

        let mut events = Map::new();
        let mut messages = Map::new();
        let mut sounds = Map::new();

        for event in EventType::ALL {
            let key = event.as_str();
            let expected = default_event_config(event, self.sound, self.notification);

            let explicit = self.overrides.get(&event).copied().unwrap_or_default();

            if let Some(actual) = self.events.get(&event).copied() {
                let mut diff = Map::new();
                if explicit.sound.is_some() || actual.sound != expected.sound {
                    diff.insert("sound".into(), json!(actual.sound));
                }
                if explicit.notification.is_some() || actual.notification != expected.notification {
                    diff.insert("notification".into(), json!(actual.notification));
                }
                if !diff.is_empty() {
                    events.insert(key.into(), Value::Object(diff));
                }
            }

            if let Some(message) = self.messages.get(&event) {
                if message != default_message(event) {
                    messages.insert(key.into(), json!(message));
                }
            }

            if let Some(Some(path)) = self.sounds.get(&event) {
                sounds.insert(key.into(), json!(path));
            }
        }

        for (key, map) in [("events", events), ("messages", messages), ("sounds", sounds)] {
            if !map.is_empty() {
                out.insert(key.into(), Value::Object(map));
            }
        }

        Value::Object(out)
    }

    /// Overwrite `path` with pretty-printed JSON and a trailing newline
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(&self.to_json())?;
        content.push('\n');

        std::fs::write(path, content)?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Change the global sound flag
    ///
    /// Events without an explicit sound flag that matched the old global
    /// default move with it. Explicit flags are left alone.
    pub fn set_global_sound(&mut self, enabled: bool) {
        for (event, flags) in &mut self.events {
            let pinned = self
                .overrides
                .get(event)
                .is_some_and(|o| o.sound.is_some());
            let before = default_event_config(*event, self.sound, self.notification);
            if !pinned && flags.sound == before.sound {
                flags.sound = default_event_config(*event, enabled, self.notification).sound;
            }
        }
        self.sound = enabled;
    }

    pub fn event(&self, event: EventType) -> EventConfig {
        self.events
            .get(&event)
            .copied()
            .unwrap_or_else(|| default_event_config(event, self.sound, self.notification))
    }

    pub fn is_event_sound_enabled(&self, event: EventType) -> bool {
        self.event(event).sound
    }

    pub fn is_event_notification_enabled(&self, event: EventType) -> bool {
        self.event(event).notification
    }

    /// Message text shown in the notification body
    pub fn message(&self, event: EventType) -> &str {
        self.messages
            .get(&event)
            .map_or_else(|| default_message(event), String::as_str)
    }

    /// User-configured sound file, if any
    pub fn sound_path(&self, event: EventType) -> Option<&str> {
        self.sounds.get(&event).and_then(|s| s.as_deref())
    }

    /// Icon path, only when `showIcon` is set and the file exists
    pub fn icon_path(&self, install_dir: &Path) -> Option<PathBuf> {
        if !self.show_icon {
            return None;
        }
        let path = install_dir.join(ICON_RELATIVE_PATH);
        path.is_file().then_some(path)
    }

    /// Notification timeout in whole milliseconds
    pub fn timeout_ms(&self) -> u32 {
        (self.timeout * 1000.0).min(f64::from(u32::MAX)) as u32
    }
}

/// Directory holding bundled assets (`assets/`, `sounds/`)
///
/// `$AGENT_NOTIFIER_HOME`, else the directory of the running executable.
pub fn install_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(home);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(json: &str) -> NotifierConfig {
        NotifierConfig::from_json(&serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = NotifierConfig::default();
        assert!(config.sound);
        assert!(config.notification);
        assert_eq!(config.timeout, 5.0);
        assert!(config.show_project_name);
        assert!(config.show_icon);
        assert_eq!(config.notification_system, NotificationSystem::Osascript);
        assert!(!config.suppress_when_focused);
        assert!(!config.command.enabled);
        assert_eq!(config.command.min_duration, 0.0);

        for event in EventType::ALL {
            assert!(config.events.contains_key(&event));
            assert!(config.messages.contains_key(&event));
            assert!(config.sounds.contains_key(&event));
        }
        assert_eq!(config.message(EventType::Complete), "Session has finished");
    }

    #[test]
    fn test_subagent_complete_opt_in() {
        let config = parse(r#"{"sound": true, "notification": true}"#);
        assert_eq!(
            config.event(EventType::SubagentComplete),
            EventConfig {
                sound: false,
                notification: false
            }
        );
        assert!(config.is_event_sound_enabled(EventType::Permission));
    }

    #[test]
    fn test_event_boolean_shorthand_overrides_global() {
        let config = parse(r#"{"sound": true, "events": {"complete": false}}"#);
        assert!(!config.is_event_sound_enabled(EventType::Complete));
        assert!(!config.is_event_notification_enabled(EventType::Complete));
        assert!(config.is_event_sound_enabled(EventType::Error));
    }

    #[test]
    fn test_event_partial_object() {
        let config = parse(r#"{"notification": false, "events": {"error": {"sound": false}}}"#);
        assert_eq!(
            config.event(EventType::Error),
            EventConfig {
                sound: false,
                notification: false
            }
        );

        let config = parse(r#"{"events": {"subagent_complete": {"notification": true}}}"#);
        assert_eq!(
            config.event(EventType::SubagentComplete),
            EventConfig {
                sound: false,
                notification: true
            }
        );
    }

    #[test]
    fn test_legacy_top_level_keys() {
        let config = parse(r#"{"permission": {"sound": false}, "question": false}"#);
        assert!(!config.is_event_sound_enabled(EventType::Permission));
        assert!(config.is_event_notification_enabled(EventType::Permission));
        assert!(!config.is_event_notification_enabled(EventType::Question));
    }

    #[test]
    fn test_nested_wins_over_legacy() {
        let config = parse(r#"{"complete": false, "events": {"complete": true}}"#);
        assert!(config.is_event_sound_enabled(EventType::Complete));
        assert!(config.is_event_notification_enabled(EventType::Complete));
    }

    #[test]
    fn test_invalid_nested_falls_through_to_legacy() {
        let config = parse(r#"{"complete": false, "events": {"complete": "loud"}}"#);
        assert!(!config.is_event_sound_enabled(EventType::Complete));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        for raw in ["0", "-3", "\"10\"", "null"] {
            let config = parse(&format!(r#"{{"timeout": {raw}}}"#));
            assert_eq!(config.timeout, DEFAULT_TIMEOUT_SECS, "timeout {raw}");
        }
        assert_eq!(parse(r#"{"timeout": 12}"#).timeout, 12.0);
        assert_eq!(parse(r#"{"timeout": 2.5}"#).timeout_ms(), 2500);
    }

    #[test]
    fn test_command_parsing() {
        let config = parse(
            r#"{"command": {"enabled": true, "path": "/usr/bin/say", "args": ["{message}"], "minDuration": 30}}"#,
        );
        assert!(config.command.enabled);
        assert_eq!(config.command.path, "/usr/bin/say");
        assert_eq!(config.command.args, Some(vec!["{message}".to_string()]));
        assert_eq!(config.command.min_duration, 30.0);

        let config = parse(r#"{"command": {"args": ["ok", 3], "minDuration": -1}}"#);
        assert_eq!(config.command.args, None);
        assert_eq!(config.command.min_duration, 0.0);

        let config = parse(r#"{"command": {"args": "not-a-list"}}"#);
        assert_eq!(config.command.args, None);
    }

    #[test]
    fn test_messages_and_sounds() {
        let config = parse(
            r#"{"messages": {"error": "Boom", "complete": 4}, "sounds": {"error": "/tmp/boom.wav", "question": ""}}"#,
        );
        assert_eq!(config.message(EventType::Error), "Boom");
        assert_eq!(config.message(EventType::Complete), "Session has finished");
        assert_eq!(config.sound_path(EventType::Error), Some("/tmp/boom.wav"));
        assert_eq!(config.sound_path(EventType::Question), None);
    }

    #[test]
    fn test_notification_system_values() {
        assert_eq!(
            parse(r#"{"notificationSystem": "node-notifier"}"#).notification_system,
            NotificationSystem::Native
        );
        assert_eq!(
            parse(r#"{"notificationSystem": "growl"}"#).notification_system,
            NotificationSystem::Osascript
        );
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        assert_eq!(NotifierConfig::load_from_path(&path), NotifierConfig::default());
        assert!(!path.exists(), "load must not create the file");
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        std::fs::write(&path, "{ sound: nope").unwrap();
        assert_eq!(NotifierConfig::load_from_path(&path), NotifierConfig::default());

        std::fs::write(&path, "[1, 2]").unwrap();
        assert_eq!(NotifierConfig::load_from_path(&path), NotifierConfig::default());
    }

    #[test]
    fn test_save_omits_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        NotifierConfig::default().save_to_path(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        let saved: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(saved, json!({"sound": true, "notification": true}));
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "sound": false,
                "timeout": 9,
                "showIcon": false,
                "notificationSystem": "native",
                "suppressWhenFocused": true,
                "command": {"enabled": true, "path": "notify-send", "args": ["{event}"], "minDuration": 15},
                "complete": {"notification": false},
                "events": {"permission": {"sound": true}, "subagent_complete": true},
                "messages": {"question": "Look here"},
                "sounds": {"error": "/tmp/err.wav"}
            }"#,
        )
        .unwrap();

        let original = NotifierConfig::load_from_path(&path);
        original.save_to_path(&path).unwrap();
        let reloaded = NotifierConfig::load_from_path(&path);

        assert_eq!(original, reloaded);
        assert!(reloaded.is_event_sound_enabled(EventType::Permission));
        assert!(!reloaded.is_event_sound_enabled(EventType::Complete));
        assert!(!reloaded.is_event_notification_enabled(EventType::Complete));
    }

    #[test]
    fn test_set_global_sound_carries_following_events() {
        let mut config = parse(r#"{"events": {"error": {"sound": false}}}"#);

        config.set_global_sound(false);
        assert!(!config.sound);
        assert!(!config.is_event_sound_enabled(EventType::Complete));
        assert!(!config.is_event_sound_enabled(EventType::SubagentComplete));
        assert_eq!(
            config.to_json(),
            json!({"sound": false, "notification": true, "events": {"error": {"sound": false}}})
        );

        config.set_global_sound(true);
        assert!(config.is_event_sound_enabled(EventType::Complete));
        assert!(!config.is_event_sound_enabled(EventType::SubagentComplete));
        assert!(!config.is_event_sound_enabled(EventType::Error));
    }

    #[test]
    fn test_explicit_event_flag_survives_global_changes() {
        let mut config = parse(r#"{"sound": false, "events": {"permission": {"sound": true}}}"#);

        config.set_global_sound(true);
        let reloaded = NotifierConfig::from_json(&config.to_json());
        assert!(reloaded.is_event_sound_enabled(EventType::Permission));
        assert_eq!(
            reloaded.to_json()["events"],
            json!({"permission": {"sound": true}})
        );

        let mut reloaded = reloaded;
        reloaded.set_global_sound(false);
        assert!(reloaded.is_event_sound_enabled(EventType::Permission));
        assert!(!reloaded.is_event_sound_enabled(EventType::Complete));
    }

    #[test]
    fn test_icon_path() {
        let tmp = TempDir::new().unwrap();
        let config = NotifierConfig::default();
        assert_eq!(config.icon_path(tmp.path()), None);

        std::fs::create_dir_all(tmp.path().join("assets")).unwrap();
        std::fs::write(tmp.path().join(ICON_RELATIVE_PATH), b"png").unwrap();
        assert_eq!(
            config.icon_path(tmp.path()),
            Some(tmp.path().join(ICON_RELATIVE_PATH))
        );

        let hidden = parse(r#"{"showIcon": false}"#);
        assert_eq!(hidden.icon_path(tmp.path()), None);
    }
}
