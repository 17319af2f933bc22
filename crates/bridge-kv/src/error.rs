use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("duplicate record: {kind} {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("record not found: {kind} {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown field {field} on record kind {kind}")]
    UnknownField { kind: &'static str, field: String },
}

pub type Result<T> = std::result::Result<T, KvError>;
