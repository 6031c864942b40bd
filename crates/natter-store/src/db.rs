use rusqlite::Connection;

use crate::error::Result;

/// Initialise the messages table and its index.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            channel    TEXT    NOT NULL,
            author     TEXT    NOT NULL,
            body       TEXT    NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel, created_at, id);",
    )?;
    Ok(())
}
