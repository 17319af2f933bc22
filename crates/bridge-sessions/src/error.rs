use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("kv store error: {0}")]
    Kv(#[from] bridge_kv::KvError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
