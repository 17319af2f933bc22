use serde::{Deserialize, Serialize};

/// A raw event as delivered by the transport's `on_message` callback (spec
/// §6 Transport API). Transport-agnostic: concrete transports (e.g.
/// `bridge-telegram`) construct this from their own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub chat_id: String,
    pub message_id: i64,
    pub sender: String,
    pub text: String,
    /// `true` if the transport event carried an attachment (photo, voice
    /// note, etc). The bytes themselves never cross into the job (spec
    /// §4.3 step 4) — enrichment fetches media by `(chat_id, message_id)`.
    pub has_media: bool,
    pub reply_to: Option<i64>,
    pub timestamp: f64,
}

/// A fully-formed job descriptor: scalars, references, and id lists only —
/// never downloaded bytes, never a network call (spec §4.3 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub chat_id: String,
    pub message_id: i64,
    pub sender: String,
    /// Text with bot-handle mentions stripped.
    pub text: String,
    pub has_media: bool,
    pub reply_to: Option<i64>,
    pub youtube_urls: Vec<String>,
    pub other_urls: Vec<String>,
    pub timestamp: f64,
}
