use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::records::BridgeEvent;
use crate::store::KvStore;

/// Periodically purges `BridgeEvent` rows older than `max_age` (spec §3
/// Bridge event: "subject to age-based cleanup (default 7 days)"; grounded
/// in `original_source/models/bridge_event.py::cleanup_old`, which the
/// original ran as an ad-hoc management command — here it runs as a
/// background loop following the same shutdown-signal idiom as the
/// watchdog and history mirror).
pub struct RetentionSweeper {
    kv: KvStore,
    interval: Duration,
    max_age_seconds: f64,
}

impl RetentionSweeper {
    pub fn new(kv: KvStore, interval: Duration, max_age_seconds: f64) -> Self {
        Self {
            kv,
            interval,
            max_age_seconds,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retention sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn sweep_once(&self) {
        let cutoff = now_epoch_seconds() - self.max_age_seconds;
        match self.kv.delete_older_than::<BridgeEvent>("timestamp", cutoff).await {
            Ok(count) if count > 0 => info!(count, "purged stale bridge events"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "bridge event cleanup sweep failed"),
        }
    }
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
    use crate::namespace::Namespace;
    use crate::records::StoredRecord;
    use crate::store::KvStore;

    async fn test_kv() -> KvStore {
        KvStore::connect("redis://127.0.0.1:6379", Namespace::Test)
            .await
            .expect("redis must be reachable for this test")
    }

    #[tokio::test]
    #[ignore = "requires a local redis instance"]
    async fn sweep_deletes_only_events_older_than_cutoff() {
        let kv = test_kv().await;
        kv.flush_namespace().await.unwrap();

        let now = now_epoch_seconds();
        let old = kv
            .create(BridgeEvent {
                event_id: String::new(),
                event_type: "session_failed".into(),
                chat_id: None,
                project_key: None,
                timestamp: now - (8.0 * 86_400.0),
                data: serde_json::json!({}),
            })
            .await
            .unwrap();
        let recent = kv
            .create(BridgeEvent {
                event_id: String::new(),
                event_type: "session_failed".into(),
                chat_id: None,
                project_key: None,
                timestamp: now,
                data: serde_json::json!({}),
            })
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(kv.clone(), Duration::from_secs(3600), 7.0 * 86_400.0);
        sweeper.sweep_once().await;

        assert!(kv.get::<BridgeEvent>(&old.key()).await.unwrap().is_none());
        assert!(kv.get::<BridgeEvent>(&recent.key()).await.unwrap().is_some());
    }
}
