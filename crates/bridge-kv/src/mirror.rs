use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::error::KvError;
use crate::pubsub::PubSub;
use crate::records::{Direction, MessageRecord, MessageType};
use crate::store::KvStore;

/// Persistence subscriber that keeps the KV `MessageRecord` mirror current
/// (spec §4.2: "Writes MUST also publish a `messages` event so the KV
/// mirror stays current"; spec §2: "Side channels publish events to the KV
/// pub/sub for persistence subscribers (history mirror, bridge-event
/// log)").
///
/// The archive store is the durable source of truth; this mirror only
/// materializes a `MessageRecord` for each `messages` event so in-process
/// readers (session routing, watchdog) can query messages through the same
/// `KvStore` surface as every other record type, without a round trip to
/// SQLite.
pub struct HistoryMirror {
    kv: KvStore,
    pubsub: PubSub,
}

impl HistoryMirror {
    pub fn new(kv: KvStore, pubsub: PubSub) -> Self {
        Self { kv, pubsub }
    }

    /// Runs until `shutdown` broadcasts `true`, same idiom as the watchdog
    /// and MCP background loops (spec §5 cancellation).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.pubsub.subscribe("messages").await;
        info!("history mirror subscribed to messages channel");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(payload) => self.mirror_one(payload).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("history mirror shutting down");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self, payload))]
    async fn mirror_one(&self, payload: serde_json::Value) {
        let record = match parse_message_record(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "malformed messages event, skipping");
                return;
            }
        };

        match self.kv.create(record).await {
            Ok(_) => {}
            Err(KvError::Duplicate { .. }) => {
                // Already mirrored (e.g. the mirror reprocessed an event
                // after a reconnect) — the (chat_id, message_id) uniqueness
                // constraint only applies to inbound messages anyway.
            }
            Err(e) => warn!(error = %e, "failed to write message mirror"),
        }
    }
}

fn parse_message_record(payload: serde_json::Value) -> Result<MessageRecord, serde_json::Error> {
    #[derive(serde::Deserialize)]
    struct MessageEvent {
        chat_id: String,
        message_id: i64,
        direction: Direction,
        sender: String,
        content: String,
        timestamp: f64,
        message_type: MessageType,
        session_id: Option<String>,
    }

    let event: MessageEvent = serde_json::from_value(payload)?;
    Ok(MessageRecord {
        msg_id: String::new(),
        chat_id: event.chat_id,
        message_id: event.message_id,
        direction: event.direction,
        sender: event.sender,
        content: event.content,
        timestamp: event.timestamp,
        message_type: event.message_type,
        session_id: event.session_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use serde_json::json;

    async fn test_kv() -> KvStore {
        KvStore::connect("redis://127.0.0.1:6379", Namespace::Test)
            .await
            .expect("redis must be reachable for this test")
    }

    #[tokio::test]
    #[ignore = "requires a local redis instance"]
    async fn mirrors_a_published_message_event_into_the_kv_store() {
        let kv = test_kv().await;
        kv.flush_namespace().await.unwrap();
        let pubsub = PubSub::new();
        let mirror = HistoryMirror::new(kv.clone(), pubsub.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(mirror.run(shutdown_rx));

        // Give the mirror a moment to subscribe before publishing.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        pubsub
            .publish(
                "messages",
                json!({
                    "id": 1,
                    "chat_id": "100",
                    "message_id": 1,
                    "direction": "in",
                    "sender": "tom",
                    "content": "hello",
                    "timestamp": 1.0,
                    "message_type": "text",
                    "session_id": null,
                }),
            )
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let _ = shutdown_tx.send(true);
        let _ = handle.await;

        let mirrored = kv
            .query::<MessageRecord>()
            .filter("chat_id", "100")
            .unwrap()
            .all()
            .await
            .unwrap();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].content, "hello");
    }

    #[test]
    fn malformed_payload_fails_to_parse() {
        let result = parse_message_record(json!({"not": "a message event"}));
        assert!(result.is_err());
    }
}
