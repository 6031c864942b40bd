use std::sync::Mutex;

use natter_core::config::{MAX_AUTHOR_BYTES, MAX_BODY_BYTES};
use natter_core::Message;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db;
use crate::error::{Result, StoreError};

/// Durable append-only log of chat messages, keyed by channel.
///
/// Wraps a single SQLite connection in a `Mutex`. For high-concurrency
/// deployments consider a connection pool (e.g. r2d2), but a Mutex is
/// sufficient for the single-node target.
///
/// `created_at` is clamped to never decrease within one store instance,
/// so the `(created_at, id)` read order matches insertion order even if
/// the wall clock steps backwards between appends.
pub struct MessageStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    conn: Connection,
    last_ts: i64,
}

impl MessageStore {
    /// Open a store over an existing connection, initialising the schema
    /// if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        // Seed the clamp from whatever is already on disk so ordering
        // holds across restarts too.
        let last_ts: i64 = conn.query_row(
            "SELECT COALESCE(MAX(created_at), 0) FROM messages",
            [],
            |row| row.get(0),
        )?;
        Ok(Self {
            inner: Mutex::new(StoreInner { conn, last_ts }),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Validate, timestamp and persist a message. Returns the stored record
    /// with its assigned id.
    ///
    /// `author` and `body` are trimmed before validation; the trimmed form
    /// is what gets stored.
    #[instrument(skip(self, author, body))]
    pub fn append(&self, channel: &str, author: &str, body: &str) -> Result<Message> {
        let author = validate_field("author", author, MAX_AUTHOR_BYTES)?;
        let body = validate_field("body", body, MAX_BODY_BYTES)?;

        let mut inner = self.inner.lock().unwrap();
        let created_at = chrono::Utc::now().timestamp_millis().max(inner.last_ts);
        inner.conn.execute(
            "INSERT INTO messages (channel, author, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![channel, author, body, created_at],
        )?;
        let id = inner.conn.last_insert_rowid();
        inner.last_ts = created_at;

        debug!(id, author = %author, "message appended");
        Ok(Message {
            id,
            author,
            body,
            created_at,
        })
    }

    /// All messages on a channel, oldest first.
    pub fn list_ordered(&self, channel: &str) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut stmt = inner.conn.prepare(
            "SELECT id, author, body, created_at
             FROM messages
             WHERE channel = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![channel], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The most recent `limit` messages on a channel, oldest first.
    pub fn list_recent(&self, channel: &str, limit: usize) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut stmt = inner.conn.prepare(
            "SELECT id, author, body, created_at
             FROM messages
             WHERE channel = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![channel, limit as i64], row_to_message)?;
        // Reverse so oldest first
        let mut msgs: Vec<_> = rows.filter_map(|r| r.ok()).collect();
        msgs.reverse();
        Ok(msgs)
    }

    /// Number of messages stored on a channel.
    pub fn count(&self, channel: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let n: i64 = inner.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE channel = ?1",
            rusqlite::params![channel],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

/// Map a SQLite row to a `Message`.
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        author: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Trim and bound-check a text field.
fn validate_field(field: &'static str, value: &str, max_bytes: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation {
            field,
            reason: "must not be empty".into(),
        });
    }
    if trimmed.len() > max_bytes {
        return Err(StoreError::Validation {
            field,
            reason: format!("exceeds {max_bytes} bytes"),
        });
    }
    Ok(trimmed.to_string())
}
