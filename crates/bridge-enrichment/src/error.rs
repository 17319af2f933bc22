use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("media provider error: {0}")]
    Media(String),

    #[error("youtube provider error: {0}")]
    Youtube(String),

    #[error("link summary provider error: {0}")]
    Link(String),

    #[error("reply chain error: {0}")]
    ReplyChain(#[from] bridge_transport::TransportError),

    #[error("sub-step timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, EnrichmentError>;
