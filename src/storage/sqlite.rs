//! SQLite-backed session and image stores
//!
//! One store serves both traits. Connections are not Sync, so the single
//! connection sits behind a std mutex; every call is a short transaction and
//! contention is negligible next to network time.

use super::{ImageRecord, ImageStore, SessionState, SessionStore, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database and ensures the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id            TEXT PRIMARY KEY,
                domain        TEXT NOT NULL,
                finished      INTEGER NOT NULL DEFAULT 0,
                visited_links TEXT NOT NULL DEFAULT '',
                updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_domain ON sessions(domain);

            CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                original_url    TEXT NOT NULL UNIQUE,
                path            TEXT NOT NULL,
                original_size   INTEGER NOT NULL,
                compressed_size INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );",
        )?;
        info!(path = %path.as_ref().display(), "Opened database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database for tests
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.conn.lock().unwrap().execute_batch(
            "CREATE TABLE sessions (
                id            TEXT PRIMARY KEY,
                domain        TEXT NOT NULL,
                finished      INTEGER NOT NULL DEFAULT 0,
                visited_links TEXT NOT NULL DEFAULT '',
                updated_at    TEXT NOT NULL
            );
            CREATE TABLE images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                original_url    TEXT NOT NULL UNIQUE,
                path            TEXT NOT NULL,
                original_size   INTEGER NOT NULL,
                compressed_size INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );",
        )?;
        Ok(store)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another store call panicked; the connection
        // itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for SqliteStore {
    fn find_active_session(&self, domain: &str) -> StorageResult<Option<SessionState>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, domain, visited_links FROM sessions
                 WHERE domain = ?1 AND finished = 0
                 ORDER BY updated_at DESC LIMIT 1",
                params![domain],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(id, domain, links)| SessionState {
            id,
            domain,
            visited_links: links
                .lines()
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        }))
    }

    fn save_session(&self, state: &SessionState) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (id, domain, finished, visited_links, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                visited_links = excluded.visited_links,
                updated_at = excluded.updated_at",
            params![
                state.id,
                state.domain,
                state.visited_links.join("\n"),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn mark_finished(&self, id: &str) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET finished = 1, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl ImageStore for SqliteStore {
    fn exists_by_original_url(&self, url: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM images WHERE original_url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO images
                (original_url, path, original_size, compressed_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.original_url,
                record.path,
                record.original_size,
                record.compressed_size,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_all(&self) -> StorageResult<Vec<ImageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT original_url, path, original_size, compressed_size FROM images
             ORDER BY id",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(ImageRecord {
                    original_url: row.get(0)?,
                    path: row.get(1)?,
                    original_size: row.get(2)?,
                    compressed_size: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str, domain: &str, links: &[&str]) -> SessionState {
        SessionState {
            id: id.to_string(),
            domain: domain.to_string(),
            visited_links: links.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_save_and_find_active_session() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_session(&state("s1", "example.com", &["http://example.com/"]))
            .unwrap();

        let found = store.find_active_session("example.com").unwrap().unwrap();
        assert_eq!(found.id, "s1");
        assert_eq!(found.visited_links, vec!["http://example.com/"]);

        assert!(store.find_active_session("other.com").unwrap().is_none());
    }

    #[test]
    fn test_finished_session_is_not_active() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_session(&state("s1", "example.com", &[]))
            .unwrap();
        store.mark_finished("s1").unwrap();
        assert!(store.find_active_session("example.com").unwrap().is_none());
    }

    #[test]
    fn test_save_session_updates_links() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .save_session(&state("s1", "example.com", &["a"]))
            .unwrap();
        store
            .save_session(&state("s1", "example.com", &["a", "b"]))
            .unwrap();

        let found = store.find_active_session("example.com").unwrap().unwrap();
        assert_eq!(found.visited_links.len(), 2);
    }

    #[test]
    fn test_image_roundtrip_and_dedup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = ImageRecord {
            original_url: "http://example.com/a.png".to_string(),
            path: "/tmp/x.jpg".to_string(),
            original_size: 400_000,
            compressed_size: 200_000,
        };

        assert!(!store
            .exists_by_original_url("http://example.com/a.png")
            .unwrap());
        store.save(&record).unwrap();
        assert!(store
            .exists_by_original_url("http://example.com/a.png")
            .unwrap());

        // Duplicate saves are ignored.
        store.save(&record).unwrap();
        assert_eq!(store.list_all().unwrap(), vec![record]);
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .save_session(&state("s1", "example.com", &[]))
            .unwrap();
        drop(store);
        assert!(path.exists());

        // Reopening sees the persisted session.
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_active_session("example.com").unwrap().is_some());
    }
}
