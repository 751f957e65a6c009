#[cfg(unix)]
pub mod socket;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::host::SessionSnapshot;

/// Lifecycle moments that can produce a notification, sound, or command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent is blocked on a permission prompt
    Permission,
    /// Root session went idle (task finished)
    Complete,
    /// Child session went idle
    SubagentComplete,
    /// Session reported an error
    Error,
    /// Agent asked the user a question
    Question,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Permission,
        EventType::Complete,
        EventType::SubagentComplete,
        EventType::Error,
        EventType::Question,
    ];

    /// Config key and `{event}` substitution value
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Permission => "permission",
            EventType::Complete => "complete",
            EventType::SubagentComplete => "subagent_complete",
            EventType::Error => "error",
            EventType::Question => "question",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host reported, before policy is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEventKind {
    /// Permission prompt shown (any of the host's spellings)
    PermissionRequested,
    /// Session went idle; root vs child is decided by the dispatcher
    SessionIdle,
    /// Host already knows the idle session is a subagent
    SubagentIdle,
    /// Session error
    SessionError,
    /// The question tool is about to run
    QuestionAsked,
    /// Anything else the host emits
    Other(String),
}

/// A parsed host event plus the session context shipped with it
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub kind: HostEventKind,
    pub session_id: Option<String>,
    /// Working directory of the session, used for the project name
    pub directory: Option<String>,
    /// Session snapshots the host attached for parent/message lookups
    pub sessions: Vec<SessionSnapshot>,
}

/// Plugin-style envelope: `{"type": "session.idle", "properties": {...}}`
///
/// Hook points arrive the same way with `hook` instead of `type`.
#[derive(Debug, Deserialize)]
struct PluginEnvelope {
    #[serde(rename = "type", alias = "hook")]
    kind: String,
    #[serde(default, alias = "input")]
    properties: Value,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    session: Option<SessionSnapshot>,
    #[serde(default)]
    sessions: Vec<SessionSnapshot>,
}

/// Raw input from Claude Code hooks (stdin JSON)
///
/// Only includes fields we actively use. Serde ignores unknown fields by default.
#[derive(Debug, Clone, Deserialize)]
struct ClaudeHookInput {
    /// Unique session identifier
    #[serde(default)]
    session_id: Option<String>,
    /// Hook type that triggered this event
    hook_event_name: String,
    /// Tool name for PreToolUse
    #[serde(default)]
    tool_name: Option<String>,
    /// Current working directory
    #[serde(default)]
    cwd: Option<String>,
}

impl ClaudeHookInput {
    fn kind(&self) -> HostEventKind {
        match self.hook_event_name.as_str() {
            "PermissionRequest" => HostEventKind::PermissionRequested,
            "Stop" => HostEventKind::SessionIdle,
            "SubagentStop" => HostEventKind::SubagentIdle,
            "StopFailure" => HostEventKind::SessionError,
            "PreToolUse" if self.tool_name.as_deref() == Some("AskUserQuestion") => {
                HostEventKind::QuestionAsked
            }
            other => HostEventKind::Other(other.to_string()),
        }
    }
}

/// Session id keys seen across host versions
const SESSION_ID_KEYS: [&str; 3] = ["sessionID", "sessionId", "session_id"];

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn plugin_kind(kind: &str, properties: &Value) -> HostEventKind {
    match kind {
        "permission.updated" | "permission.asked" | "permission.ask" => {
            HostEventKind::PermissionRequested
        }
        "session.idle" => HostEventKind::SessionIdle,
        "session.error" => HostEventKind::SessionError,
        "tool.execute.before"
            if properties.get("tool").and_then(Value::as_str) == Some("question") =>
        {
            HostEventKind::QuestionAsked
        }
        other => HostEventKind::Other(other.to_string()),
    }
}

impl HostEvent {
    /// Parse a single JSON event from either host envelope
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(input)?)
    }

    /// Interpret an already-parsed JSON event
    pub fn from_value(value: Value) -> Result<Self> {
        if value.get("hook_event_name").is_some() {
            let hook: ClaudeHookInput = serde_json::from_value(value)?;
            return Ok(Self {
                kind: hook.kind(),
                session_id: hook.session_id.filter(|s| !s.is_empty()),
                directory: hook.cwd,
                sessions: Vec::new(),
            });
        }

        let envelope: PluginEnvelope = serde_json::from_value(value)?;
        let kind = plugin_kind(&envelope.kind, &envelope.properties);

        // session.error may carry the id only inside the error payload
        let session_id = string_field(&envelope.properties, &SESSION_ID_KEYS)
            .or_else(|| {
                envelope
                    .properties
                    .get("info")
                    .and_then(|info| string_field(info, &SESSION_ID_KEYS))
            })
            .or_else(|| envelope.session.as_ref().map(|s| s.id.clone()));

        let directory = envelope.directory.or_else(|| {
            string_field(&envelope.properties, &["directory", "cwd"])
        });

        let mut sessions = envelope.sessions;
        if let Some(session) = envelope.session {
            sessions.push(session);
        }

        Ok(Self {
            kind,
            session_id,
            directory,
            sessions,
        })
    }
}
