use thiserror::Error;

/// Any failure here is logged and the event is dropped — the user can
/// resend (spec §4.3 Failure policy). The enum exists for structured
/// logging, not for callers to recover on.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed transport event: {0}")]
    MalformedEvent(String),

    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
