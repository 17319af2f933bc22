pub mod error;
pub mod extract;
pub mod handler;
pub mod types;

pub use error::{IngestError, Result};
pub use extract::{extract_urls, strip_all_mentions, strip_bot_mention};
pub use handler::{IngestHandler, JobSink};
pub use types::{JobDescriptor, RawEvent};
