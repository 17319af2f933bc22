use thiserror::Error;

/// Errors a `Transport` implementation can return (spec §6). The split
/// mirrors the delivery worker's retry policy: `Transient` failures are
/// retried with backoff, `Permanent` failures are routed straight to the
/// dead letter.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("permanent transport failure: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
