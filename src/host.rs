//! Session queries answered on behalf of the host application
//!
//! The host ships a snapshot of the relevant sessions with each event
//! (parent linkage plus message roles and creation times). The dispatcher
//! only talks to the `HostClient` trait, so a live client can replace the
//! snapshot without touching dispatch logic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::{NotifierError, Result};

/// Creation time of a message, epoch milliseconds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: Option<i64>,
}

/// One message in a session's history
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSnapshot {
    /// "user" or "assistant"
    pub role: String,
    #[serde(default)]
    pub time: MessageTime,
}

/// Session metadata as reported by the host
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    /// Set for child (subagent) sessions
    #[serde(default, rename = "parentID", alias = "parentId", alias = "parent_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageSnapshot>,
}

/// Session queries the dispatcher needs from the host
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Parent session id, `None` for a root session
    async fn parent_session(&self, session_id: &str) -> Result<Option<String>>;

    /// Creation time of the most recent user-authored message
    async fn last_user_message_at(&self, session_id: &str) -> Result<Option<DateTime<Utc>>>;
}

/// `HostClient` backed by the snapshots attached to an event
#[derive(Debug, Default)]
pub struct SnapshotHost {
    sessions: HashMap<String, SessionSnapshot>,
}

impl SnapshotHost {
    pub fn new(sessions: impl IntoIterator<Item = SessionSnapshot>) -> Self {
        Self {
            sessions: sessions.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    fn session(&self, session_id: &str) -> Result<&SessionSnapshot> {
        self.sessions.get(session_id).ok_or_else(|| {
            NotifierError::Backend(format!("session {session_id} not in event snapshot"))
        })
    }
}

#[async_trait]
impl HostClient for SnapshotHost {
    async fn parent_session(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .session(session_id)?
            .parent_id
            .clone()
            .filter(|p| !p.is_empty()))
    }

    async fn last_user_message_at(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .session(session_id)?
            .messages
            .iter()
            .filter(|m| m.role == "user")
            .filter_map(|m| m.time.created)
            .max()
            .and_then(DateTime::from_timestamp_millis))
    }
}
