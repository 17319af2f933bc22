use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::instrument;

use bridge_core::types::{truncate_content, MessageDirection, MessageType, MAX_CONTENT_CHARS};
use bridge_kv::PubSub;

use crate::db::init_db;
use crate::error::{ArchiveError, Result};
use crate::types::{ArchivedMessage, ChatStats, NewMessage, SearchHit, StoreOutcome};

/// How far `Search`'s recency boost looks back by default when the caller
/// doesn't override `max_age_days` (spec §4.2).
const DEFAULT_MAX_AGE_DAYS: f64 = 30.0;

/// Durable append-only store with the same logical schema as the Message
/// mirror (spec §4.2). Single-writer `Mutex<Connection>`, matching the
/// teacher's SQLite manager shape.
pub struct ArchiveStore {
    db: Mutex<Connection>,
    /// Publishes a `messages` event on every write so the KV mirror and any
    /// other persistence subscriber stay current (spec §4.2).
    pubsub: Option<PubSub>,
}

impl ArchiveStore {
    pub fn new(conn: Connection, pubsub: Option<PubSub>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            pubsub,
        })
    }

    /// Idempotent by `(chat_id, message_id)`: storing the same message
    /// twice returns the existing row rather than inserting a duplicate
    /// (spec §4.2, §8 round-trip property).
    #[instrument(skip(self, msg), fields(chat_id = %msg.chat_id, message_id = msg.message_id))]
    pub async fn store(&self, msg: NewMessage) -> Result<StoreOutcome> {
        let content = truncate_content(&msg.content).into_owned();
        let direction = msg.direction.to_string();
        let message_type = msg.message_type.to_string();

        let outcome = {
            let db = self.db.lock().unwrap();
            let existing: Option<i64> = db
                .query_row(
                    "SELECT id FROM messages WHERE chat_id = ?1 AND message_id = ?2",
                    params![msg.chat_id, msg.message_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                StoreOutcome { stored: false, id }
            } else {
                db.execute(
                    "INSERT INTO messages
                        (chat_id, message_id, direction, sender, content, timestamp,
                         message_type, session_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        msg.chat_id,
                        msg.message_id,
                        direction,
                        msg.sender,
                        content,
                        msg.timestamp,
                        message_type,
                        msg.session_id,
                    ],
                )?;
                let id = db.last_insert_rowid();
                db.execute(
                    "INSERT INTO messages_fts(rowid, content) VALUES (?1, ?2)",
                    params![id, content],
                )?;
                StoreOutcome { stored: true, id }
            }
        };

        if outcome.stored {
            if let Some(pubsub) = &self.pubsub {
                // Carries every field the KV mirror needs so its subscriber
                // can materialize a `MessageRecord` without a round trip
                // back through this store (spec §4.2).
                pubsub
                    .publish(
                        "messages",
                        json!({
                            "id": outcome.id,
                            "chat_id": msg.chat_id,
                            "message_id": msg.message_id,
                            "direction": msg.direction,
                            "sender": msg.sender,
                            "content": content,
                            "timestamp": msg.timestamp,
                            "message_type": msg.message_type,
                            "session_id": msg.session_id,
                        }),
                    )
                    .await;
            }
        }

        Ok(outcome)
    }

    /// Most recent `limit` messages for a chat, newest first.
    pub fn recent(&self, chat_id: &str, limit: usize) -> Result<Vec<ArchivedMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, chat_id, message_id, direction, sender, content, timestamp,
                    message_type, session_id
             FROM messages
             WHERE chat_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![chat_id, limit as i64], row_to_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ArchiveError::from)
    }

    /// Keyword match plus recency weighting over a chat's history (spec
    /// §4.2). No full-text index beyond SQLite FTS5 is introduced — the
    /// weighting is a simple linear decay over `max_age_days`, matching the
    /// original's lack of a real search engine.
    pub fn search(
        &self,
        chat_id: &str,
        query: &str,
        max_results: usize,
        max_age_days: Option<f64>,
    ) -> Result<Vec<SearchHit>> {
        let max_age_days = max_age_days.unwrap_or(DEFAULT_MAX_AGE_DAYS);
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT m.id, m.chat_id, m.message_id, m.direction, m.sender, m.content,
                    m.timestamp, m.message_type, m.session_id, bm25(messages_fts) AS rank
             FROM messages m
             JOIN messages_fts f ON m.id = f.rowid
             WHERE m.chat_id = ?1 AND messages_fts MATCH ?2
             ORDER BY rank
             LIMIT ?3",
        )?;
        // FTS5's MATCH treats bare punctuation as a syntax error; quote the
        // whole query as a phrase so arbitrary user text is always valid.
        let phrase = format!("\"{}\"", query.replace('"', "\"\""));
        let now = now_epoch_seconds();

        let rows = stmt.query_map(
            params![chat_id, phrase, (max_results * 4) as i64],
            |row| {
                let message = row_to_message(row)?;
                let rank: f64 = row.get(9)?;
                Ok((message, rank))
            },
        )?;

        let mut hits: Vec<SearchHit> = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(message, rank)| {
                let age_days = (now - message.timestamp).max(0.0) / 86_400.0;
                let recency = (1.0 - age_days / max_age_days).max(0.0);
                // bm25 scores are negative and lower-is-better; flip sign so
                // larger combined score means a better hit.
                let score = -rank + recency;
                SearchHit { message, score }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(max_results);
        Ok(hits)
    }

    /// Aggregate counters for a chat (spec §4.2).
    pub fn stats(&self, chat_id: &str) -> Result<ChatStats> {
        let db = self.db.lock().unwrap();
        let (total, first, last): (i64, Option<f64>, Option<f64>) = db.query_row(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ChatStats {
            chat_id: chat_id.to_string(),
            total_messages: total,
            first_seen: first,
            last_seen: last,
        })
    }
}

fn now_epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArchivedMessage> {
    let direction_str: String = row.get(3)?;
    let type_str: String = row.get(7)?;
    let content: String = row.get(5)?;
    debug_assert!(content.chars().count() <= MAX_CONTENT_CHARS);

    Ok(ArchivedMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        message_id: row.get(2)?,
        direction: MessageDirection::from_str(&direction_str)
            .unwrap_or(MessageDirection::In),
        sender: row.get(4)?,
        content,
        timestamp: row.get(6)?,
        message_type: MessageType::from_str(&type_str).unwrap_or(MessageType::Text),
        session_id: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(chat_id: &str, message_id: i64, content: &str) -> NewMessage {
        NewMessage {
            chat_id: chat_id.to_string(),
            message_id,
            direction: MessageDirection::In,
            sender: "tom".to_string(),
            content: content.to_string(),
            timestamp: now_epoch_seconds(),
            message_type: MessageType::Text,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn store_is_idempotent_by_chat_and_message_id() {
        let store = ArchiveStore::new(Connection::open_in_memory().unwrap(), None).unwrap();
        let a = store.store(new_message("100", 1, "hello")).await.unwrap();
        let b = store.store(new_message("100", 1, "hello again")).await.unwrap();
        assert!(a.stored);
        assert!(!b.stored);
        assert_eq!(a.id, b.id);

        let stats = store.stats("100").unwrap();
        assert_eq!(stats.total_messages, 1);
    }

    #[tokio::test]
    async fn recent_orders_newest_first() {
        let store = ArchiveStore::new(Connection::open_in_memory().unwrap(), None).unwrap();
        let mut msg = new_message("100", 1, "first");
        msg.timestamp = 1.0;
        store.store(msg).await.unwrap();
        let mut msg2 = new_message("100", 2, "second");
        msg2.timestamp = 2.0;
        store.store(msg2).await.unwrap();

        let recent = store.recent("100", 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "second");
    }

    #[tokio::test]
    async fn search_finds_keyword_matches_for_the_chat() {
        let store = ArchiveStore::new(Connection::open_in_memory().unwrap(), None).unwrap();
        store.store(new_message("100", 1, "deploy the frobnicator")).await.unwrap();
        store.store(new_message("100", 2, "unrelated chit chat")).await.unwrap();
        store.store(new_message("200", 3, "deploy something else")).await.unwrap();

        let hits = store.search("100", "frobnicator", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.message_id, 1);
    }
}
