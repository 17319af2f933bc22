use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A type stored through the generic `KvStore` CRUD/query surface (spec §9
/// "polymorphic records" — a closed, tagged variant set dispatched by
/// `TYPE_TAG`).
///
/// `INDEXED_FIELDS` lists the fields a `Query::filter` may match on;
/// `SORTED_FIELDS` lists `(field, scope_field)` pairs a `Query::range` may
/// traverse, optionally partitioned by another field (e.g. `timestamp`
/// sorted within a `chat_id` scope, per spec §3 Message).
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TYPE_TAG: &'static str;
    const AUTO_KEY: bool;
    const INDEXED_FIELDS: &'static [&'static str];
    const SORTED_FIELDS: &'static [(&'static str, Option<&'static str>)];

    fn key(&self) -> String;
    fn set_key(&mut self, key: String);

    /// String value of an indexed or scope field, used to build index/zset
    /// keys. `None` means the field is unset on this record instance.
    fn field_str(&self, field: &str) -> Option<String>;

    /// Numeric score of a sorted field.
    fn sort_score(&self, field: &str) -> Option<f64>;

    /// Extra uniqueness constraint beyond the primary key, e.g. Message's
    /// `(chat_id, message_id)` constraint which only applies to inbound
    /// messages (spec §3 invariants). `None` disables the check.
    fn unique_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Media,
    Response,
    Acknowledgment,
}

/// KV mirror of a chat message (spec §3 Message). The durable copy lives in
/// `bridge-archive`; this record exists for pub/sub fan-out and fast lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub msg_id: String,
    pub chat_id: String,
    pub message_id: i64,
    pub direction: Direction,
    pub sender: String,
    pub content: String,
    pub timestamp: f64,
    pub message_type: MessageType,
    pub session_id: Option<String>,
}

impl StoredRecord for MessageRecord {
    const TYPE_TAG: &'static str = "message";
    const AUTO_KEY: bool = true;
    const INDEXED_FIELDS: &'static [&'static str] = &["chat_id"];
    const SORTED_FIELDS: &'static [(&'static str, Option<&'static str>)] =
        &[("timestamp", Some("chat_id"))];

    fn key(&self) -> String {
        self.msg_id.clone()
    }

    fn set_key(&mut self, key: String) {
        self.msg_id = key;
    }

    fn field_str(&self, field: &str) -> Option<String> {
        match field {
            "chat_id" => Some(self.chat_id.clone()),
            _ => None,
        }
    }

    fn sort_score(&self, field: &str) -> Option<f64> {
        match field {
            "timestamp" => Some(self.timestamp),
            _ => None,
        }
    }

    fn unique_key(&self) -> Option<String> {
        // "at most one inbound Message record" per (chat_id, message_id).
        match self.direction {
            Direction::In => Some(format!("{}:{}", self.chat_id, self.message_id)),
            Direction::Out => None,
        }
    }
}

/// Analytics/debug event (spec §3 Bridge event). Subject to age-based
/// cleanup (default 7 days) performed by the caller, not this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    #[serde(default)]
    pub event_id: String,
    pub event_type: String,
    pub chat_id: Option<String>,
    pub project_key: Option<String>,
    pub timestamp: f64,
    pub data: serde_json::Value,
}

impl StoredRecord for BridgeEvent {
    const TYPE_TAG: &'static str = "bridge_event";
    const AUTO_KEY: bool = true;
    const INDEXED_FIELDS: &'static [&'static str] = &["event_type"];
    const SORTED_FIELDS: &'static [(&'static str, Option<&'static str>)] = &[("timestamp", None)];

    fn key(&self) -> String {
        self.event_id.clone()
    }

    fn set_key(&mut self, key: String) {
        self.event_id = key;
    }

    fn field_str(&self, field: &str) -> Option<String> {
        match field {
            "event_type" => Some(self.event_type.clone()),
            _ => None,
        }
    }

    fn sort_score(&self, field: &str) -> Option<f64> {
        match field {
            "timestamp" => Some(self.timestamp),
            _ => None,
        }
    }
}

/// An undeliverable outbound message awaiting replay (spec §3 Dead letter).
/// Owned exclusively by `bridge-delivery`; this crate only stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    #[serde(default)]
    pub letter_id: String,
    pub chat_id: String,
    pub reply_to: Option<i64>,
    pub text: String,
    pub created_at: f64,
    #[serde(default)]
    pub attempts: u32,
}

impl StoredRecord for DeadLetterRecord {
    const TYPE_TAG: &'static str = "dead_letter";
    const AUTO_KEY: bool = true;
    const INDEXED_FIELDS: &'static [&'static str] = &["chat_id"];
    const SORTED_FIELDS: &'static [(&'static str, Option<&'static str>)] =
        &[("created_at", None)];

    fn key(&self) -> String {
        self.letter_id.clone()
    }

    fn set_key(&mut self, key: String) {
        self.letter_id = key;
    }

    fn field_str(&self, field: &str) -> Option<String> {
        match field {
            "chat_id" => Some(self.chat_id.clone()),
            _ => None,
        }
    }

    fn sort_score(&self, field: &str) -> Option<f64> {
        match field {
            "created_at" => Some(self.created_at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Dormant,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Dormant => "dormant",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationType {
    Bug,
    Feature,
    Chore,
}

/// An agent session (spec §3 Agent session). `status` and `project_key` are
/// key-typed fields: per the key-field mutation anomaly (spec §9), changing
/// either requires `KvStore::transition`, never an in-place field write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSessionRecord {
    pub session_id: String,
    pub project_key: String,
    pub status: SessionStatus,
    pub chat_id: String,
    pub sender: String,
    pub started_at: f64,
    pub last_activity: f64,
    #[serde(default)]
    pub tool_call_count: u64,
    pub branch_name: Option<String>,
    pub work_item_slug: Option<String>,
    pub message_text: String,
    pub classification_type: Option<ClassificationType>,
    pub classification_confidence: Option<f64>,
}

impl StoredRecord for AgentSessionRecord {
    const TYPE_TAG: &'static str = "agent_session";
    const AUTO_KEY: bool = false;
    const INDEXED_FIELDS: &'static [&'static str] = &["project_key", "status", "chat_id"];
    const SORTED_FIELDS: &'static [(&'static str, Option<&'static str>)] = &[
        ("started_at", Some("project_key")),
        ("last_activity", None),
    ];

    fn key(&self) -> String {
        self.session_id.clone()
    }

    fn set_key(&mut self, key: String) {
        self.session_id = key;
    }

    fn field_str(&self, field: &str) -> Option<String> {
        match field {
            "project_key" => Some(self.project_key.clone()),
            "status" => Some(self.status.to_string()),
            "chat_id" => Some(self.chat_id.clone()),
            _ => None,
        }
    }

    fn sort_score(&self, field: &str) -> Option<f64> {
        match field {
            "started_at" => Some(self.started_at),
            "last_activity" => Some(self.last_activity),
            _ => None,
        }
    }
}
