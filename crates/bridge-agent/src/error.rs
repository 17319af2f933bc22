use thiserror::Error;

/// Disposition matches spec §7's `Fatal` row: a fatal agent error transitions
/// the owning session to `failed` and is surfaced to the watchdog via a
/// bridge event; it is never retried by the worker.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent invocation failed fatally: {0}")]
    Fatal(String),

    #[error("agent invocation was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AgentError>;
