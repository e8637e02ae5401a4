//! Persistence for crawl sessions and compressed images

mod sqlite;

pub use sqlite::SqliteStore;

use thiserror::Error;

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persistable snapshot of a crawl session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub domain: String,
    pub visited_links: Vec<String>,
}

/// One compressed image on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub original_url: String,
    pub path: String,
    pub original_size: u64,
    pub compressed_size: u64,
}

/// Persistence for crawl sessions
///
/// An "active" session is one that has not been marked finished; a new crawl
/// of the same domain resumes it instead of starting over.
pub trait SessionStore: Send + Sync {
    fn find_active_session(&self, domain: &str) -> StorageResult<Option<SessionState>>;
    fn save_session(&self, state: &SessionState) -> StorageResult<()>;
    fn mark_finished(&self, id: &str) -> StorageResult<()>;
}

/// Persistence for compressed image records
pub trait ImageStore: Send + Sync {
    fn exists_by_original_url(&self, url: &str) -> StorageResult<bool>;
    fn save(&self, record: &ImageRecord) -> StorageResult<()>;
    fn list_all(&self) -> StorageResult<Vec<ImageRecord>>;
}
