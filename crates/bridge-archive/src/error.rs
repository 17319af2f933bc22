use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("message not found: {chat_id}/{message_id}")]
    NotFound { chat_id: String, message_id: i64 },

    #[error("unknown message direction/type stored in row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
