use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Bound on each subscriber's inbox. A slow subscriber drops its oldest
/// queued message rather than stalling the publisher (spec §4.1 Publish).
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// In-process fan-out bus backing `KvStore::publish`/`subscribe`.
///
/// The spec's pub/sub contract (bounded per-subscriber queue, publishers
/// never block) is independent of the record store's backing transport, so
/// this is implemented directly over `tokio::sync::mpsc` rather than
/// routed through Redis — the same shape as `SchedulerEngine`'s per-job
/// `try_send` in the teacher.
#[derive(Clone, Default)]
pub struct PubSub {
    channels: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<serde_json::Value>>>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns the receiving half. The
    /// caller drives `handler` over the stream; dropping the receiver
    /// unsubscribes.
    pub async fn subscribe(&self, channel: &str) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let mut channels = self.channels.lock().await;
        channels.entry(channel.to_string()).or_default().push(tx);
        rx
    }

    /// Fans `payload` out to every live subscriber of `channel`.
    /// Non-blocking: a full subscriber queue drops the new message and logs
    /// a warning rather than stalling the publisher.
    pub async fn publish(&self, channel: &str, payload: serde_json::Value) {
        let mut channels = self.channels.lock().await;
        let Some(subs) = channels.get_mut(channel) else {
            return;
        };

        subs.retain(|tx| !tx.is_closed());
        for tx in subs.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(payload.clone()) {
                warn!(channel, "subscriber queue full, dropping message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let bus = PubSub::new();
        let mut a = bus.subscribe("messages").await;
        let mut b = bus.subscribe("messages").await;

        bus.publish("messages", json!({"hello": "world"})).await;

        assert_eq!(a.recv().await.unwrap()["hello"], "world");
        assert_eq!(b.recv().await.unwrap()["hello"], "world");
    }

    #[tokio::test]
    async fn publish_on_unknown_channel_is_a_noop() {
        let bus = PubSub::new();
        bus.publish("nobody-home", json!({})).await;
    }

    #[tokio::test]
    async fn full_subscriber_queue_drops_without_blocking_publisher() {
        let (tx, mut rx) = mpsc::channel(1);
        let bus = PubSub::new();
        bus.channels
            .lock()
            .await
            .insert("chan".to_string(), vec![tx]);

        bus.publish("chan", json!(1)).await;
        bus.publish("chan", json!(2)).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first, json!(1));
    }
}
