use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a chat/conversation on the originating transport.
///
/// Transport-native (e.g. a Telegram chat id as a string); the bridge treats
/// it as an opaque key, never parsing its internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an agent session (UUIDv7 — time-sortable so the
/// first 8 characters are useful as a short id in logs and alerts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, used in watchdog alerts and branch names.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies the project/workspace a session belongs to.
///
/// A session is addressed by `(project_key, chat_id)`; the same project can
/// receive messages from multiple chats, and resume lookup is scoped to this
/// pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectKey(pub String);

impl ProjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Direction of a mirrored message (§3 Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    In,
    Out,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::In => write!(f, "in"),
            MessageDirection::Out => write!(f, "out"),
        }
    }
}

impl std::str::FromStr for MessageDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in" => Ok(MessageDirection::In),
            "out" => Ok(MessageDirection::Out),
            other => Err(format!("unknown message direction: {}", other)),
        }
    }
}

/// Kind of a mirrored message (§3 Message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Media,
    Response,
    Acknowledgment,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Media => write!(f, "media"),
            MessageType::Response => write!(f, "response"),
            MessageType::Acknowledgment => write!(f, "acknowledgment"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "media" => Ok(MessageType::Media),
            "response" => Ok(MessageType::Response),
            "acknowledgment" => Ok(MessageType::Acknowledgment),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

/// Hard cap on mirrored message / dead-letter text length (§3 invariant).
///
/// Callers truncate, they never reject on this bound.
pub const MAX_CONTENT_CHARS: usize = 20_000;

/// Truncates `s` to at most `MAX_CONTENT_CHARS` characters, splitting on a
/// char boundary rather than a byte offset.
pub fn truncate_content(s: &str) -> std::borrow::Cow<'_, str> {
    if s.chars().count() <= MAX_CONTENT_CHARS {
        std::borrow::Cow::Borrowed(s)
    } else {
        std::borrow::Cow::Owned(s.chars().take(MAX_CONTENT_CHARS).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_short_is_time_sortable_prefix() {
        let id = SessionId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn message_direction_round_trips_through_str() {
        assert_eq!("in".parse::<MessageDirection>().unwrap(), MessageDirection::In);
        assert_eq!("out".parse::<MessageDirection>().unwrap(), MessageDirection::Out);
        assert!("sideways".parse::<MessageDirection>().is_err());
    }

    #[test]
    fn truncate_content_respects_char_boundary() {
        let long = "x".repeat(MAX_CONTENT_CHARS + 50);
        let truncated = truncate_content(&long);
        assert_eq!(truncated.chars().count(), MAX_CONTENT_CHARS);

        let short = "hello";
        assert_eq!(truncate_content(short), short);
    }
}
