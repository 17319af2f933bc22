use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("session error: {0}")]
    Session(#[from] bridge_sessions::SessionError),

    #[error("agent error: {0}")]
    Agent(#[from] bridge_agent::AgentError),

    #[error("delivery error: {0}")]
    Delivery(#[from] bridge_delivery::DeliveryError),

    #[error("tool-use log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
