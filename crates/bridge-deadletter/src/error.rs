use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("kv store error: {0}")]
    Kv(#[from] bridge_kv::KvError),
}

pub type Result<T> = std::result::Result<T, DeadLetterError>;
