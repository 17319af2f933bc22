pub mod error;
pub mod mirror;
pub mod namespace;
pub mod pubsub;
pub mod records;
pub mod retention;
pub mod store;

pub use error::{KvError, Result};
pub use mirror::HistoryMirror;
pub use namespace::Namespace;
pub use retention::RetentionSweeper;
pub use pubsub::PubSub;
pub use records::{
    AgentSessionRecord, BridgeEvent, ClassificationType, DeadLetterRecord, Direction,
    MessageRecord, MessageType, SessionStatus, StoredRecord,
};
pub use store::{KvStore, QueryBuilder};
