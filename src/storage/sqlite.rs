//! SQLite-based content storage implementation

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, ToSql, params};
use tracing::{debug, error, info, warn};

use super::models::{ContentRecord, ImageRecord, TextRecord};
use crate::clock::{Clock, SystemClock};
use crate::types::ContentKind;

/// Content storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} message {id} is already stored")]
    IdConflict { kind: ContentKind, id: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

fn table(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Text => "messages",
        ContentKind::Image => "images",
    }
}

fn payload_column(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Text => "content",
        ContentKind::Image => "picture",
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// SQLite-based store for recently posted text and image content
///
/// One connection behind a mutex. The event worker is the only writer; the
/// health endpoint reads counts through the same lock.
pub struct ContentStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    /// Last `inserted_at` handed out, in Unix milliseconds
    last_stamp: Mutex<i64>,
}

impl ContentStore {
    /// Create or open a content store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening content store at {:?}", path);

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn, clock);
        store.initialize_schema(true)?;

        Ok(store)
    }

    /// Store backed by an in-memory database
    pub fn in_memory() -> StorageResult<Self> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn, clock);
        store.initialize_schema(false)?;
        Ok(store)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock,
            last_stamp: Mutex::new(i64::MIN),
        }
    }

    /// Remove a database file and its WAL side files
    ///
    /// Returns `true` if the main file existed.
    pub fn wipe<P: AsRef<Path>>(path: P) -> StorageResult<bool> {
        let path = path.as_ref();
        let existed = path.exists();

        for suffix in ["", "-wal", "-shm"] {
            let mut target = path.as_os_str().to_owned();
            target.push(suffix);
            match std::fs::remove_file(&target) {
                Ok(()) => debug!("Removed {:?}", target),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(existed)
    }

    /// Initialize database schema
    fn initialize_schema(&self, on_disk: bool) -> StorageResult<()> {
        let conn = self.conn.lock();

        if on_disk {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                sender TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                picture BLOB NOT NULL,
                sender TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_inserted_at ON messages(inserted_at)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_images_inserted_at ON images(inserted_at)",
            [],
        )?;

        debug!("Content store schema initialized");
        Ok(())
    }

    /// Timestamp for the next insert, never earlier than the previous one
    fn next_stamp(&self) -> i64 {
        let now = self.clock.now().timestamp_millis();
        let mut last = self.last_stamp.lock();
        *last = now.max(*last);
        *last
    }

    /// Store a text message
    ///
    /// Fails with [`StorageError::IdConflict`] if the id is already stored;
    /// the existing record is left as it was.
    pub fn put_text(&self, id: &str, body: &str, sender: &str) -> StorageResult<()> {
        self.insert(ContentKind::Text, id, &body, sender)
    }

    /// Store an image message
    pub fn put_image(&self, id: &str, payload: &[u8], sender: &str) -> StorageResult<()> {
        self.insert(ContentKind::Image, id, &payload, sender)
    }

    fn insert(
        &self,
        kind: ContentKind,
        id: &str,
        payload: &dyn ToSql,
        sender: &str,
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let stamp = self.next_stamp();

        let sql = format!(
            "INSERT INTO {} (id, {}, sender, inserted_at) VALUES (?1, ?2, ?3, ?4)",
            table(kind),
            payload_column(kind)
        );

        let tx = conn.transaction()?;
        match tx.execute(&sql, params![id, payload, sender, stamp]) {
            Ok(_) => {}
            Err(e) if is_primary_key_violation(&e) => {
                debug!("{} message {} already exists", kind, id);
                return Err(StorageError::IdConflict {
                    kind,
                    id: id.to_string(),
                });
            }
            Err(e) => {
                error!("Failed to save {} message {}: {}", kind, id, e);
                return Err(e.into());
            }
        }
        tx.commit()?;

        debug!("Saved {} message {} from {}", kind, id, sender);
        Ok(())
    }

    pub fn get_text(&self, id: &str) -> StorageResult<Option<TextRecord>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT id, content, sender, inserted_at FROM messages WHERE id = ?1",
            params![id],
            |row| {
                Ok(TextRecord {
                    id: row.get(0)?,
                    body: row.get(1)?,
                    sender: row.get(2)?,
                    inserted_at: from_millis(row.get(3)?),
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_image(&self, id: &str) -> StorageResult<Option<ImageRecord>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT id, picture, sender, inserted_at FROM images WHERE id = ?1",
            params![id],
            |row| {
                Ok(ImageRecord {
                    id: row.get(0)?,
                    payload: row.get(1)?,
                    sender: row.get(2)?,
                    inserted_at: from_millis(row.get(3)?),
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact-key lookup in one collection
    pub fn get(&self, kind: ContentKind, id: &str) -> StorageResult<Option<ContentRecord>> {
        Ok(match kind {
            ContentKind::Text => self.get_text(id)?.map(ContentRecord::from),
            ContentKind::Image => self.get_image(id)?.map(ContentRecord::from),
        })
    }

    /// Delete one record; deleting an absent id is not an error
    pub fn delete(&self, kind: ContentKind, id: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        let sql = format!("DELETE FROM {} WHERE id = ?1", table(kind));
        let removed = conn.execute(&sql, params![id])?;
        debug!("Deleted {} {} message(s) with id {}", removed, kind, id);
        Ok(())
    }

    /// Delete every record of `kind` inserted at or before `now - max_age`
    ///
    /// Returns the number of rows removed.
    pub fn sweep(&self, kind: ContentKind, max_age: chrono::Duration) -> StorageResult<usize> {
        let cutoff = (self.clock.now() - max_age).timestamp_millis();
        let conn = self.conn.lock();
        let sql = format!("DELETE FROM {} WHERE inserted_at <= ?1", table(kind));

        let removed = conn.execute(&sql, params![cutoff]).inspect_err(|e| {
            warn!("Failed to sweep {} messages: {}", kind, e);
        })?;

        if removed > 0 {
            debug!("Swept {} aged {} message(s)", removed, kind);
        }
        Ok(removed)
    }

    /// Number of records currently held for `kind`
    pub fn count(&self, kind: ContentKind) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", table(kind));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
