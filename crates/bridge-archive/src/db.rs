use rusqlite::{Connection, Result};

/// Initialise archive tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     TEXT NOT NULL,
            message_id  INTEGER NOT NULL,
            direction   TEXT NOT NULL,
            sender      TEXT NOT NULL,
            content     TEXT NOT NULL,
            timestamp   REAL NOT NULL,
            message_type TEXT NOT NULL,
            session_id  TEXT,
            UNIQUE(chat_id, message_id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id);
        CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
            ON messages(chat_id, timestamp);",
    )
}

/// FTS5 virtual table for keyword search across message content.
/// content='' makes it an external-content table — we sync manually on write.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts
            USING fts5(content, content='messages', content_rowid='id');",
    )
}
