use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("dead letter store error: {0}")]
    DeadLetter(#[from] bridge_deadletter::DeadLetterError),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
