use serde::{Deserialize, Serialize};

use bridge_core::types::{MessageDirection, MessageType};

/// Durable copy of a mirrored message (spec §3 Message).
///
/// Logically the same schema as `bridge_kv::MessageRecord`; this is the
/// archive's own representation so the crate has no hard dependency on the
/// KV record's field layout evolving independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub id: i64,
    pub chat_id: String,
    pub message_id: i64,
    pub direction: MessageDirection,
    pub sender: String,
    pub content: String,
    pub timestamp: f64,
    pub message_type: MessageType,
    pub session_id: Option<String>,
}

/// A message awaiting its first durable write; `ArchiveStore::store`
/// assigns the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub chat_id: String,
    pub message_id: i64,
    pub direction: MessageDirection,
    pub sender: String,
    pub content: String,
    pub timestamp: f64,
    pub message_type: MessageType,
    pub session_id: Option<String>,
}

/// Result of `ArchiveStore::store` — whether a new row was written or the
/// call found an existing one for the same `(chat_id, message_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    pub stored: bool,
    pub id: i64,
}

/// Aggregate counters returned by `ArchiveStore::stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStats {
    pub chat_id: String,
    pub total_messages: i64,
    pub first_seen: Option<f64>,
    pub last_seen: Option<f64>,
}

/// A `Search` hit: the message plus the recency-weighted score it was
/// ranked by (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub message: ArchivedMessage,
    pub score: f64,
}
