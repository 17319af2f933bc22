pub mod error;
pub mod manager;

pub use bridge_kv::DeadLetterRecord;
pub use error::{DeadLetterError, Result};
pub use manager::DeadLetterStore;
