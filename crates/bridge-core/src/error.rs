use thiserror::Error;

/// Error taxonomy shared across the bridge (spec §7).
///
/// Individual crates define their own narrower error enums where useful and
/// convert into this one at the process boundary (bridge-gateway), so a
/// single error surface is available for top-level logging.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("record not found: {kind} {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("duplicate record: {kind} {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient transport error: {0}")]
    TransientTransport(String),

    #[error("permanent transport error: {0}")]
    PermanentTransport(String),

    #[error("transient integration error: {0}")]
    TransientIntegration(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Short error code string, useful for structured logging.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "CONFIG_ERROR",
            BridgeError::NotFound { .. } => "NOT_FOUND",
            BridgeError::Duplicate { .. } => "DUPLICATE",
            BridgeError::Validation(_) => "VALIDATION",
            BridgeError::TransientTransport(_) => "TRANSIENT_TRANSPORT",
            BridgeError::PermanentTransport(_) => "PERMANENT_TRANSPORT",
            BridgeError::TransientIntegration(_) => "TRANSIENT_INTEGRATION",
            BridgeError::Fatal(_) => "FATAL",
            BridgeError::Serialization(_) => "SERIALIZATION",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether a caller should retry this operation (vs dead-letter/drop).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::TransientTransport(_) | BridgeError::TransientIntegration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
