use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("server '{server_name}' is already registered")]
    AlreadyRegistered { server_name: String },

    #[error("server '{server_name}' is not registered")]
    NotRegistered { server_name: String },

    #[error("routing rule '{name}' not found")]
    RuleNotFound { name: String },

    #[error("inter-server messaging is disabled")]
    MessagingDisabled,

    #[error("target server '{server_name}' not found")]
    TargetNotFound { server_name: String },
}

pub type Result<T> = std::result::Result<T, McpError>;
