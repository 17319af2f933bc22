pub mod config;
pub mod error;
pub mod types;

pub use error::{BridgeError, Result};
pub use types::{ChatId, MessageDirection, MessageType, ProjectKey, SessionId};
