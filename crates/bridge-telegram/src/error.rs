/// Errors produced by the Telegram `Transport` implementation.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("no bot token configured")]
    NoToken,
}

/// Classifies a teloxide request error per the spec §7 error taxonomy:
/// network-shaped failures and rate limiting are transient and worth
/// retrying; API errors (e.g. chat blocked the bot) are permanent.
impl From<TelegramError> for bridge_transport::TransportError {
    fn from(err: TelegramError) -> Self {
        match &err {
            TelegramError::Teloxide(req_err) => match req_err {
                teloxide::RequestError::Network(_) | teloxide::RequestError::RetryAfter(_) => {
                    bridge_transport::TransportError::Transient(err.to_string())
                }
                teloxide::RequestError::Api(_) => {
                    bridge_transport::TransportError::Permanent(err.to_string())
                }
                _ => bridge_transport::TransportError::Transient(err.to_string()),
            },
            TelegramError::NoToken => bridge_transport::TransportError::Permanent(err.to_string()),
        }
    }
}
