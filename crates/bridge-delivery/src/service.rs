use std::sync::Arc;

use bridge_archive::{ArchiveStore, NewMessage};
use bridge_core::types::{MessageDirection, MessageType};
use bridge_deadletter::DeadLetterStore;
use bridge_transport::Transport;
use tracing::{instrument, warn};

use crate::chunk::chunk_text;
use crate::error::Result;

/// Text is truncated to `limit - 3` chars plus `"..."` when a replayed dead
/// letter no longer fits the transport limit (spec §4.7 schema drift case).
const TRUNCATION_SUFFIX: &str = "...";

/// Sender recorded on the Message mirror for every outbound chunk (spec §3
/// Message) — the bridge has no per-deployment bot display name to use.
const AGENT_SENDER: &str = "agent";

/// Sends agent replies back over the transport with at-least-once semantics
/// (spec §4.7). Owns the dead-letter store exclusively.
pub struct DeliveryService {
    transport: Arc<dyn Transport>,
    dead_letters: DeadLetterStore,
    archive: Option<Arc<ArchiveStore>>,
    max_chunk_chars: usize,
    retry_max: u32,
}

impl DeliveryService {
    pub fn new(
        transport: Arc<dyn Transport>,
        dead_letters: DeadLetterStore,
        max_chunk_chars: usize,
        retry_max: u32,
    ) -> Self {
        Self {
            transport,
            dead_letters,
            archive: None,
            max_chunk_chars,
            retry_max,
        }
    }

    /// Mirrors every chunk actually sent into the durable archive (spec §3
    /// Message: "Created on both inbound receipt and outbound delivery").
    /// Replayed dead letters are not re-archived — they were already
    /// recorded on their first delivery attempt.
    pub fn with_archive(mut self, archive: Arc<ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Delivers `text` to `chat_id`, threaded as a reply to `reply_to` if
    /// given. Every chunk that exhausts its retries is dead-lettered; the
    /// caller always sees `Ok(())` — the bridge has handed off
    /// responsibility (spec §4.7, §7 propagation policy). `session_id` is
    /// recorded on the archived copy of each chunk when set.
    #[instrument(skip(self, text), fields(chat_id = %chat_id, chunks = tracing::field::Empty))]
    pub async fn deliver(
        &self,
        chat_id: &str,
        reply_to: Option<i64>,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        let chunks = chunk_text(text, self.max_chunk_chars);
        tracing::Span::current().record("chunks", chunks.len());

        for chunk in chunks {
            self.send_with_retries(chat_id, reply_to, &chunk, session_id).await?;
        }

        Ok(())
    }

    async fn send_with_retries(
        &self,
        chat_id: &str,
        reply_to: Option<i64>,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        let mut last_err = None;

        for attempt in 0..=self.retry_max {
            match self.transport.send_message(chat_id, text, reply_to).await {
                Ok(id) => {
                    self.archive_outbound(chat_id, id, text, session_id).await;
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "transient send failure, retrying");
                    last_err = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "permanent send failure, dead-lettering");
                    last_err = Some(e);
                    break;
                }
            }
        }

        warn!(error = ?last_err, "delivery retries exhausted, persisting dead letter");
        let created_at = now_epoch_seconds();
        self.dead_letters
            .persist(chat_id, reply_to, text, created_at)
            .await?;

        Ok(())
    }

    async fn archive_outbound(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        session_id: Option<&str>,
    ) {
        let Some(archive) = &self.archive else { return };

        let outcome = archive
            .store(NewMessage {
                chat_id: chat_id.to_string(),
                message_id,
                direction: MessageDirection::Out,
                sender: AGENT_SENDER.to_string(),
                content: text.to_string(),
                timestamp: now_epoch_seconds(),
                message_type: MessageType::Response,
                session_id: session_id.map(str::to_string),
            })
            .await;

        if let Err(e) = outcome {
            warn!(chat_id, error = %e, "failed to archive outbound message");
        }
    }

    /// Reads every pending dead letter in insertion order and attempts
    /// redelivery (spec §4.7 Replay): success deletes the record, failure
    /// increments `attempts` and keeps it. Runs once at startup.
    #[instrument(skip(self))]
    pub async fn replay(&self) -> Result<()> {
        let pending = self.dead_letters.list_pending().await?;
        for mut letter in pending {
            let text = if letter.text.chars().count() > self.max_chunk_chars {
                truncate_for_replay(&letter.text, self.max_chunk_chars)
            } else {
                letter.text.clone()
            };

            match self
                .transport
                .send_message(&letter.chat_id, &text, letter.reply_to)
                .await
            {
                Ok(_id) => {
                    self.dead_letters.delete(&letter).await?;
                }
                Err(e) => {
                    warn!(letter_id = %letter.letter_id, error = %e, "replay failed, keeping dead letter");
                    self.dead_letters.increment_attempts(&mut letter).await?;
                }
            }
        }
        Ok(())
    }
}

fn truncate_for_replay(text: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(TRUNCATION_SUFFIX.len());
    let truncated: String = text.chars().take(keep).collect();
    format!("{truncated}{TRUNCATION_SUFFIX}")
}

fn now_epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_kv::{KvStore, Namespace};
    use bridge_transport::{MessageHandler, TransportError, TransportMessage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FlakyTransport {
        fail_times: AtomicU32,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn connect(&self) -> bridge_transport::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> bridge_transport::Result<()> {
            Ok(())
        }
        async fn send_message(
            &self,
            _chat_id: &str,
            text: &str,
            _reply_to: Option<i64>,
        ) -> bridge_transport::Result<i64> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Transient("boom".to_string()));
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(1)
        }
        async fn get_messages(
            &self,
            _chat_id: &str,
            _ids: &[i64],
        ) -> bridge_transport::Result<Vec<TransportMessage>> {
            Ok(Vec::new())
        }
        fn on_message(&self, _handler: MessageHandler) {}
    }

    struct AlwaysFailsTransport;

    #[async_trait]
    impl Transport for AlwaysFailsTransport {
        async fn connect(&self) -> bridge_transport::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> bridge_transport::Result<()> {
            Ok(())
        }
        async fn send_message(
            &self,
            _chat_id: &str,
            _text: &str,
            _reply_to: Option<i64>,
        ) -> bridge_transport::Result<i64> {
            Err(TransportError::Transient("down".to_string()))
        }
        async fn get_messages(
            &self,
            _chat_id: &str,
            _ids: &[i64],
        ) -> bridge_transport::Result<Vec<TransportMessage>> {
            Ok(Vec::new())
        }
        fn on_message(&self, _handler: MessageHandler) {}
    }

    async fn test_kv() -> KvStore {
        KvStore::connect("redis://127.0.0.1:6379", Namespace::Test)
            .await
            .expect("redis must be reachable for this test")
    }

    #[tokio::test]
    #[ignore = "requires a local redis instance"]
    async fn succeeds_after_transient_retries() {
        let kv = test_kv().await;
        kv.flush_namespace().await.unwrap();
        let transport = Arc::new(FlakyTransport {
            fail_times: AtomicU32::new(2),
            sent: Mutex::new(Vec::new()),
        });
        let service = DeliveryService::new(
            transport.clone(),
            DeadLetterStore::new(kv.clone()),
            4_096,
            3,
        );

        service.deliver("100", None, "hello", None).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a local redis instance"]
    async fn exhausted_retries_persist_exactly_one_dead_letter() {
        let kv = test_kv().await;
        kv.flush_namespace().await.unwrap();
        let transport = Arc::new(AlwaysFailsTransport);
        let dead_letters = DeadLetterStore::new(kv.clone());
        let service = DeliveryService::new(transport, dead_letters, 4_096, 3);

        service.deliver("100", None, "hello", None).await.unwrap();

        let store = DeadLetterStore::new(kv);
        let pending = store.for_chat("100").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 0);
    }

    #[test]
    fn truncate_for_replay_appends_ellipsis() {
        let text = "a".repeat(10);
        let out = truncate_for_replay(&text, 8);
        assert_eq!(out, "aaaaa...");
        assert_eq!(out.chars().count(), 8);
    }
}
