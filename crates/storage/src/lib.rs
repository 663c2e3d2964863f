pub mod error;
pub mod ids;
pub mod memory;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use ids::SessionId;
pub use memory::MemoryStorage;
pub use types::{JobBookmarks, NewTurn, Role, SessionRecord, Turn};

pub trait SessionStore: Send + Sync {
    fn create_session(&self) -> StorageResult<SessionRecord>;
    /// Returns the session, creating an empty one when the id has not been seen yet.
    fn open_session(&self, session_id: SessionId) -> StorageResult<SessionRecord>;
    fn get_session(&self, session_id: SessionId) -> StorageResult<Option<SessionRecord>>;
    /// Sessions whose last activity is strictly older than `cutoff_unix_seconds`.
    fn list_idle_sessions(&self, cutoff_unix_seconds: u64) -> StorageResult<Vec<SessionId>>;
    fn remove_session(&self, session_id: SessionId) -> StorageResult<bool>;
}

pub trait TurnStore: Send + Sync {
    fn append_turn(&self, session_id: SessionId, input: NewTurn) -> StorageResult<Turn>;
    fn list_turns(&self, session_id: SessionId) -> StorageResult<Vec<Turn>>;
}

pub trait BookmarkStore: Send + Sync {
    /// Returns `false` when the job was already saved.
    fn save_job(&self, session_id: SessionId, job_id: u32) -> StorageResult<bool>;
    /// Returns `false` when the job was already applied to.
    fn apply_job(&self, session_id: SessionId, job_id: u32) -> StorageResult<bool>;
    fn bookmarks(&self, session_id: SessionId) -> StorageResult<JobBookmarks>;
}

pub trait Storage: SessionStore + TurnStore + BookmarkStore {}

impl<T> Storage for T where T: SessionStore + TurnStore + BookmarkStore {}
