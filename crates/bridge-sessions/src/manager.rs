use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use bridge_kv::{AgentSessionRecord, BridgeEvent, KvStore, SessionStatus};

use crate::classify::Classifier;
use crate::error::Result;
use crate::slug::{branch_name, slugify};
use crate::types::RouteOutcome;

/// Session lifecycle, slugging, classification and routing (spec §4.5).
///
/// The exclusive owner of `AgentSession` records (spec §3 Ownership):
/// every other component reads sessions through this registry or treats
/// the KV record as read-only.
pub struct SessionRegistry {
    kv: KvStore,
    classifier: Arc<dyn Classifier>,
    silence_threshold_secs: f64,
}

impl SessionRegistry {
    pub fn new(kv: KvStore, classifier: Arc<dyn Classifier>, silence_threshold_secs: u64) -> Self {
        Self {
            kv,
            classifier,
            silence_threshold_secs: silence_threshold_secs as f64,
        }
    }

    /// Decide whether an enriched job resumes an existing session or spawns
    /// a new one (spec §4.5).
    #[instrument(skip(self, message_text), fields(project_key, chat_id))]
    pub async fn route(
        &self,
        project_key: &str,
        chat_id: &str,
        sender: &str,
        message_text: &str,
        now: f64,
    ) -> Result<RouteOutcome> {
        if let Some(session) = self.find_resumable(project_key, chat_id, now).await? {
            let resumed = self.resume(session, now).await?;
            return Ok(RouteOutcome {
                session: resumed,
                resumed: true,
            });
        }

        let session = self.spawn(project_key, chat_id, sender, message_text, now).await?;
        Ok(RouteOutcome {
            session,
            resumed: false,
        })
    }

    async fn find_resumable(
        &self,
        project_key: &str,
        chat_id: &str,
        now: f64,
    ) -> Result<Option<AgentSessionRecord>> {
        for status in [SessionStatus::Active, SessionStatus::Dormant] {
            let candidates = self
                .kv
                .query::<AgentSessionRecord>()
                .filter("project_key", project_key)?
                .filter("chat_id", chat_id)?
                .filter("status", status.to_string())?
                .all()
                .await?;

            if let Some(session) = candidates
                .into_iter()
                .filter(|s| now - s.last_activity <= self.silence_threshold_secs)
                .max_by(|a, b| a.last_activity.partial_cmp(&b.last_activity).unwrap())
            {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    /// Reuses `session`'s id, bumping `last_activity` and un-dormanting it
    /// if needed. `last_activity` is not a key field so it updates in
    /// place; the status flip (dormant → active) does go through
    /// `transition` since `status` is a key field (spec §3, §9).
    async fn resume(&self, mut session: AgentSessionRecord, now: f64) -> Result<AgentSessionRecord> {
        if session.status == SessionStatus::Dormant {
            let mut resumed = session.clone();
            resumed.status = SessionStatus::Active;
            resumed.last_activity = now;
            session = self.kv.transition(&session, resumed).await?;
        } else {
            session.last_activity = now;
            self.kv.update(&session).await?;
        }
        info!(session_id = %session.session_id, "resumed session");
        Ok(session)
    }

    async fn spawn(
        &self,
        project_key: &str,
        chat_id: &str,
        sender: &str,
        message_text: &str,
        now: f64,
    ) -> Result<AgentSessionRecord> {
        let session_id = Uuid::now_v7().to_string();
        let slug = slugify(message_text);
        let branch_name = branch_name(&slug, &session_id);

        let classification = self.classifier.classify(message_text).await;
        if classification.is_none() {
            warn!(session_id, "classification failed, creating session without a classification");
        }

        let record = AgentSessionRecord {
            session_id: session_id.clone(),
            project_key: project_key.to_string(),
            status: SessionStatus::Active,
            chat_id: chat_id.to_string(),
            sender: sender.to_string(),
            started_at: now,
            last_activity: now,
            tool_call_count: 0,
            branch_name: Some(branch_name),
            work_item_slug: Some(slug),
            message_text: bridge_core::types::truncate_content(message_text).into_owned(),
            classification_type: classification.map(|c| c.classification_type),
            classification_confidence: classification.map(|c| c.classification_confidence),
        };

        let created = self.kv.create(record).await?;
        info!(session_id = %created.session_id, "spawned session");
        Ok(created)
    }

    /// Bumps `tool_call_count` by `count` and `last_activity` (spec §4.6
    /// step 4: "Increments tool_call_count on the session after each agent
    /// tool call"). The worker batches this into one update per job rather
    /// than one KV round trip per tool call; `tool_call_count` is still
    /// monotonically non-decreasing (spec §3 invariant) since `count` is
    /// always the number of tool calls observed in that job.
    pub async fn record_tool_calls(&self, session: &mut AgentSessionRecord, count: u64, now: f64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        session.tool_call_count += count;
        session.last_activity = now;
        self.kv.update(session).await?;
        Ok(())
    }

    /// Atomic status transition (spec §4.5, §9). The only way `status` may
    /// change — callers must not hand-roll delete+create themselves.
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    pub async fn transition_status(
        &self,
        session: AgentSessionRecord,
        new_status: SessionStatus,
    ) -> Result<AgentSessionRecord> {
        let mut next = session.clone();
        next.status = new_status;
        let updated = self.kv.transition(&session, next).await?;
        info!(session_id = %updated.session_id, status = %new_status, "session status transitioned");
        Ok(updated)
    }

    /// Sessions currently `active`, for the watchdog's periodic scan.
    pub async fn active_sessions(&self) -> Result<Vec<AgentSessionRecord>> {
        let sessions = self
            .kv
            .query::<AgentSessionRecord>()
            .filter("status", SessionStatus::Active.to_string())?
            .all()
            .await?;
        Ok(sessions)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<AgentSessionRecord>> {
        Ok(self.kv.get::<AgentSessionRecord>(session_id).await?)
    }

    /// Records an analytics/debug bridge event (spec §3 Bridge event; spec
    /// §7: "Fatal errors transition session state and emit a bridge
    /// event"). Best-effort — callers already hold the outcome they care
    /// about, so a write failure here is logged and swallowed rather than
    /// propagated.
    pub async fn emit_event(&self, event_type: &str, session: &AgentSessionRecord, data: serde_json::Value) {
        let event = BridgeEvent {
            event_id: String::new(),
            event_type: event_type.to_string(),
            chat_id: Some(session.chat_id.clone()),
            project_key: Some(session.project_key.clone()),
            timestamp: session.last_activity,
            data,
        };
        if let Err(e) = self.kv.create(event).await {
            warn!(session_id = %session.session_id, error = %e, "failed to record bridge event");
        }
    }
}
