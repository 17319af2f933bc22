pub mod chunk;
pub mod error;
pub mod service;

pub use chunk::chunk_text;
pub use error::{DeliveryError, Result};
pub use service::DeliveryService;
