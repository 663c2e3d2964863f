use serde::{Deserialize, Serialize};

use super::ids::SessionId;

/// Speaker of one stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One appended chat message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub seq: u64,
    pub role: Role,
    pub content: String,
    /// Only the fact that an image was attached survives; the pixels are never stored.
    pub had_image: bool,
    pub created_at_unix_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    pub role: Role,
    pub content: String,
    pub had_image: bool,
}

impl NewTurn {
    pub fn user(content: impl Into<String>, had_image: bool) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            had_image,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            had_image: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub turn_count: usize,
    pub created_at_unix_seconds: u64,
    pub last_seen_unix_seconds: u64,
}

/// Jobs a session has bookmarked or applied to, in the order the actions happened.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobBookmarks {
    pub saved: Vec<u32>,
    pub applied: Vec<u32>,
}
