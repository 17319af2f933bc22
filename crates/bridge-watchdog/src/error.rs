use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("session error: {0}")]
    Session(#[from] bridge_sessions::SessionError),
}

pub type Result<T> = std::result::Result<T, WatchdogError>;
