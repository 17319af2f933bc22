use tracing::instrument;

use bridge_core::types::truncate_content;
use bridge_kv::{DeadLetterRecord, KvStore};

use crate::error::Result;

/// Persists and replays undeliverable outbound messages (spec §4.7).
///
/// Owned exclusively by `bridge-delivery` (spec §3 Ownership, §5 shared
/// resources): after startup replay it is append-only from delivery
/// workers and read-only from admin inspection paths. This crate only
/// implements the storage surface; the replay loop itself lives in
/// `bridge-delivery` since it needs the transport client.
pub struct DeadLetterStore {
    kv: KvStore,
}

impl DeadLetterStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Persists a new dead letter with `attempts = 0` (spec §3).
    #[instrument(skip(self, text), fields(chat_id))]
    pub async fn persist(
        &self,
        chat_id: &str,
        reply_to: Option<i64>,
        text: &str,
        created_at: f64,
    ) -> Result<DeadLetterRecord> {
        let record = DeadLetterRecord {
            letter_id: String::new(),
            chat_id: chat_id.to_string(),
            reply_to,
            text: truncate_content(text).into_owned(),
            created_at,
            attempts: 0,
        };
        Ok(self.kv.create(record).await?)
    }

    /// Every pending dead letter, insertion order (spec §4.7 Replay, §5
    /// dead-letter replay ordering guarantee).
    pub async fn list_pending(&self) -> Result<Vec<DeadLetterRecord>> {
        Ok(self
            .kv
            .query::<DeadLetterRecord>()
            .range("created_at", f64::MIN, f64::MAX)?
            .all()
            .await?)
    }

    /// Deletes a letter after a successful replay send (spec §4.7, §8
    /// testable property 4: no orphaned records on success).
    pub async fn delete(&self, letter: &DeadLetterRecord) -> Result<()> {
        Ok(self.kv.delete(letter).await?)
    }

    /// Increments `attempts` after a failed replay, keeping the record
    /// (spec §3 invariant: `attempts` is monotonically non-decreasing).
    pub async fn increment_attempts(&self, letter: &mut DeadLetterRecord) -> Result<()> {
        letter.attempts += 1;
        self.kv.update(letter).await?;
        Ok(())
    }

    pub async fn for_chat(&self, chat_id: &str) -> Result<Vec<DeadLetterRecord>> {
        Ok(self
            .kv
            .query::<DeadLetterRecord>()
            .filter("chat_id", chat_id)?
            .all()
            .await?)
    }
}
