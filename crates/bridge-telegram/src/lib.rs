//! Concrete Telegram-backed `Transport` (spec §6 External Interfaces).

pub mod adapter;
pub mod error;
pub mod send;

pub use adapter::TelegramTransport;
pub use error::TelegramError;
