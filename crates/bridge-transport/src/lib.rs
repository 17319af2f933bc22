pub mod error;
pub mod types;

pub use error::{Result, TransportError};
pub use types::{InboundEvent, MessageHandler, Transport, TransportMessage};
