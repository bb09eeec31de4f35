//! Fleet events: the audit/notification trail surfaced over SSE. Every
//! mutation the control plane makes to its own model (and every error it
//! observes from an agent or daemon) is recorded as an [`Event`] and handed
//! to the event bus for fan-out.

use serde::{Deserialize, Serialize};

use super::ids::{AppId, DaemonId, MachineId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// The entities an event is about, so the UI can link back to them. An
/// event may reference zero, one, or several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations {
    pub machine_id: Option<MachineId>,
    pub app_id: Option<AppId>,
    pub daemon_id: Option<DaemonId>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub level: Level,
    pub text: String,
    pub relations: Relations,
}

impl Event {
    pub fn info(id: i64, created_at: chrono::DateTime<chrono::Utc>, text: impl Into<String>) -> Self {
        Self {
            id,
            created_at,
            level: Level::Info,
            text: text.into(),
            relations: Relations::default(),
        }
    }

    pub fn with_relations(mut self, relations: Relations) -> Self {
        self.relations = relations;
        self
    }
}
