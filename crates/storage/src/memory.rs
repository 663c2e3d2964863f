use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::OptionExt;

use super::error::{LockPoisonedSnafu, NotFoundSnafu, StorageResult};
use super::ids::SessionId;
use super::types::{JobBookmarks, NewTurn, SessionRecord, Turn};
use super::{BookmarkStore, SessionStore, TurnStore};

#[derive(Debug, Default)]
struct SessionEntry {
    created_at_unix_seconds: u64,
    last_seen_unix_seconds: u64,
    turns: Vec<Turn>,
    bookmarks: JobBookmarks,
}

impl SessionEntry {
    fn new(now: u64) -> Self {
        Self {
            created_at_unix_seconds: now,
            last_seen_unix_seconds: now,
            ..Self::default()
        }
    }

    fn record(&self, id: SessionId) -> SessionRecord {
        SessionRecord {
            id,
            turn_count: self.turns.len(),
            created_at_unix_seconds: self.created_at_unix_seconds,
            last_seen_unix_seconds: self.last_seen_unix_seconds,
        }
    }
}

/// Process-local store. Everything lives as long as the server process (or until evicted).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
        stage: &'static str,
    ) -> StorageResult<RwLockReadGuard<'_, HashMap<SessionId, SessionEntry>>> {
        self.sessions
            .read()
            .map_err(|_| LockPoisonedSnafu { stage }.build())
    }

    fn write(
        &self,
        stage: &'static str,
    ) -> StorageResult<RwLockWriteGuard<'_, HashMap<SessionId, SessionEntry>>> {
        self.sessions
            .write()
            .map_err(|_| LockPoisonedSnafu { stage }.build())
    }

    fn with_entry<T>(
        &self,
        session_id: SessionId,
        stage: &'static str,
        apply: impl FnOnce(&mut SessionEntry) -> T,
    ) -> StorageResult<T> {
        let mut sessions = self.write(stage)?;
        let entry = sessions.get_mut(&session_id).context(NotFoundSnafu {
            stage,
            entity: "session",
            id: session_id.to_string(),
        })?;
        entry.last_seen_unix_seconds = unix_timestamp_seconds();
        Ok(apply(entry))
    }
}

impl SessionStore for MemoryStorage {
    fn create_session(&self) -> StorageResult<SessionRecord> {
        let session_id = SessionId::new_v7();
        let entry = SessionEntry::new(unix_timestamp_seconds());
        let record = entry.record(session_id);
        self.write("create-session")?.insert(session_id, entry);
        tracing::debug!(session_id = %session_id, "session created");
        Ok(record)
    }

    fn open_session(&self, session_id: SessionId) -> StorageResult<SessionRecord> {
        let now = unix_timestamp_seconds();
        let mut sessions = self.write("open-session")?;
        let entry = sessions.entry(session_id).or_insert_with(|| {
            tracing::debug!(session_id = %session_id, "session created on first contact");
            SessionEntry::new(now)
        });
        entry.last_seen_unix_seconds = now;
        Ok(entry.record(session_id))
    }

    fn get_session(&self, session_id: SessionId) -> StorageResult<Option<SessionRecord>> {
        Ok(self
            .read("get-session")?
            .get(&session_id)
            .map(|entry| entry.record(session_id)))
    }

    fn list_idle_sessions(&self, cutoff_unix_seconds: u64) -> StorageResult<Vec<SessionId>> {
        let mut idle = self
            .read("list-idle-sessions")?
            .iter()
            .filter(|(_, entry)| entry.last_seen_unix_seconds < cutoff_unix_seconds)
            .map(|(session_id, _)| *session_id)
            .collect::<Vec<_>>();
        idle.sort();
        Ok(idle)
    }

    fn remove_session(&self, session_id: SessionId) -> StorageResult<bool> {
        Ok(self
            .write("remove-session")?
            .remove(&session_id)
            .is_some())
    }
}

impl TurnStore for MemoryStorage {
    fn append_turn(&self, session_id: SessionId, input: NewTurn) -> StorageResult<Turn> {
        self.with_entry(session_id, "append-turn", |entry| {
            let turn = Turn {
                seq: entry.turns.len() as u64,
                role: input.role,
                content: input.content,
                had_image: input.had_image,
                created_at_unix_seconds: unix_timestamp_seconds(),
            };
            entry.turns.push(turn.clone());
            turn
        })
    }

    fn list_turns(&self, session_id: SessionId) -> StorageResult<Vec<Turn>> {
        let sessions = self.read("list-turns")?;
        let entry = sessions.get(&session_id).context(NotFoundSnafu {
            stage: "list-turns",
            entity: "session",
            id: session_id.to_string(),
        })?;
        Ok(entry.turns.clone())
    }
}

impl BookmarkStore for MemoryStorage {
    fn save_job(&self, session_id: SessionId, job_id: u32) -> StorageResult<bool> {
        self.with_entry(session_id, "save-job", |entry| {
            push_unique(&mut entry.bookmarks.saved, job_id)
        })
    }

    fn apply_job(&self, session_id: SessionId, job_id: u32) -> StorageResult<bool> {
        self.with_entry(session_id, "apply-job", |entry| {
            push_unique(&mut entry.bookmarks.applied, job_id)
        })
    }

    fn bookmarks(&self, session_id: SessionId) -> StorageResult<JobBookmarks> {
        let sessions = self.read("list-bookmarks")?;
        let entry = sessions.get(&session_id).context(NotFoundSnafu {
            stage: "list-bookmarks",
            entity: "session",
            id: session_id.to_string(),
        })?;
        Ok(entry.bookmarks.clone())
    }
}

fn push_unique(ids: &mut Vec<u32>, job_id: u32) -> bool {
    if ids.contains(&job_id) {
        return false;
    }
    ids.push(job_id);
    true
}

pub(crate) fn unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, StorageError};

    #[test]
    fn open_session_creates_empty_history_once() {
        let storage = MemoryStorage::new();
        let session_id = SessionId::new_v7();

        let first = storage.open_session(session_id).expect("open");
        storage
            .append_turn(session_id, NewTurn::user("hi", false))
            .expect("append");
        let second = storage.open_session(session_id).expect("reopen");

        assert_eq!(first.turn_count, 0);
        assert_eq!(second.turn_count, 1);
        assert_eq!(first.created_at_unix_seconds, second.created_at_unix_seconds);
    }

    #[test]
    fn turns_keep_append_order_and_sequence() {
        let storage = MemoryStorage::new();
        let session = storage.create_session().expect("create");

        storage
            .append_turn(session.id, NewTurn::user("What is F-2?", true))
            .expect("user turn");
        storage
            .append_turn(session.id, NewTurn::assistant("A residence visa."))
            .expect("assistant turn");

        let turns = storage.list_turns(session.id).expect("list");
        assert_eq!(
            turns
                .iter()
                .map(|turn| (turn.seq, turn.role, turn.had_image))
                .collect::<Vec<_>>(),
            vec![(0, Role::User, true), (1, Role::Assistant, false)]
        );
    }

    #[test]
    fn store_does_not_enforce_alternation() {
        let storage = MemoryStorage::new();
        let session = storage.create_session().expect("create");

        storage
            .append_turn(session.id, NewTurn::assistant("welcome"))
            .expect("assistant first");
        storage
            .append_turn(session.id, NewTurn::assistant("again"))
            .expect("assistant twice");

        assert_eq!(storage.list_turns(session.id).expect("list").len(), 2);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let storage = MemoryStorage::new();
        let error = storage
            .append_turn(SessionId::new_v7(), NewTurn::user("hi", false))
            .expect_err("unknown session");

        assert!(matches!(
            error,
            StorageError::NotFound {
                entity: "session",
                ..
            }
        ));
    }

    #[test]
    fn bookmarks_are_deduplicated_per_action() {
        let storage = MemoryStorage::new();
        let session = storage.create_session().expect("create");

        assert!(storage.save_job(session.id, 11).expect("save"));
        assert!(!storage.save_job(session.id, 11).expect("save again"));
        assert!(storage.save_job(session.id, 3).expect("save other"));
        assert!(storage.apply_job(session.id, 11).expect("apply"));

        let bookmarks = storage.bookmarks(session.id).expect("bookmarks");
        assert_eq!(bookmarks.saved, vec![11, 3]);
        assert_eq!(bookmarks.applied, vec![11]);
    }

    #[test]
    fn idle_sessions_are_listed_and_removable() {
        let storage = MemoryStorage::new();
        let session = storage.create_session().expect("create");

        assert!(storage.list_idle_sessions(0).expect("none idle").is_empty());

        let cutoff = unix_timestamp_seconds() + 10;
        assert_eq!(
            storage.list_idle_sessions(cutoff).expect("idle"),
            vec![session.id]
        );
        assert!(storage.remove_session(session.id).expect("remove"));
        assert!(storage.get_session(session.id).expect("get").is_none());
    }

    #[test]
    fn session_id_round_trips_through_text() {
        let session_id = SessionId::new_v7();
        let parsed: SessionId = session_id.to_string().parse().expect("parse");
        assert_eq!(parsed, session_id);
        assert!(SessionId::parse("not-a-uuid").is_err());

        let json = serde_json::to_string(&session_id).expect("serialize");
        assert_eq!(json, format!("\"{session_id}\""));
    }
}
