use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use bridge_agent::{AgentInvoker, AgentRequest};
use bridge_archive::{ArchiveStore, NewMessage};
use bridge_core::types::{MessageDirection, MessageType};
use bridge_delivery::DeliveryService;
use bridge_enrichment::EnrichmentStage;
use bridge_ingest::{JobDescriptor, JobSink};
use bridge_kv::SessionStatus;
use bridge_sessions::SessionRegistry;

use crate::error::Result;
use crate::log::append_tool_event;
use crate::types::{QueueConfig, QueuedJob};

/// Per-session FIFO, bounded cross-session parallelism (spec §4.6).
///
/// Each session gets its own unbounded `mpsc` lane stored in a
/// `DashMap<String, Sender>`; a dedicated task drains a lane strictly in
/// arrival order, so ordering within a session is free. Parallelism across
/// sessions is bounded separately by a `Semaphore` sized
/// `worker_concurrency`, acquired for the duration of a single job's
/// pipeline — this keeps many idle lanes cheap while limiting how many run
/// the enrich → invoke → deliver pipeline at once.
pub struct JobQueue {
    lanes: Arc<DashMap<String, mpsc::UnboundedSender<QueuedJob>>>,
    handles: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    deps: Arc<Worker>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_grace: Duration,
    /// Cancelled once the grace period in `shutdown()` elapses, so every
    /// suspension point a worker is parked on (enrichment HTTP calls, the
    /// agent invocation, a transport send) unblocks immediately instead of
    /// running on detached from the lane task that's about to be aborted
    /// (spec §4.6: "waits … up to a grace period, then aborts"; §5: "every
    /// suspension point the worker MUST be cancellable").
    cancel: CancellationToken,
}

struct Worker {
    enrichment: Arc<EnrichmentStage>,
    invoker: Arc<dyn AgentInvoker>,
    sessions: Arc<SessionRegistry>,
    delivery: Arc<DeliveryService>,
    archive: Option<Arc<ArchiveStore>>,
    semaphore: Arc<Semaphore>,
    logs_dir: std::path::PathBuf,
    default_project_key: String,
    reenrich_on_replay: bridge_core::config::ReenrichPolicy,
    cancel: CancellationToken,
}

impl JobQueue {
    pub fn new(
        config: QueueConfig,
        enrichment: Arc<EnrichmentStage>,
        invoker: Arc<dyn AgentInvoker>,
        sessions: Arc<SessionRegistry>,
        delivery: Arc<DeliveryService>,
    ) -> Self {
        Self::new_with_archive(config, enrichment, invoker, sessions, delivery, None)
    }

    /// Same as `new`, additionally mirroring each inbound message into the
    /// durable archive before it enters the pipeline (spec §3 Message:
    /// "Created on both inbound receipt and outbound delivery").
    pub fn new_with_archive(
        config: QueueConfig,
        enrichment: Arc<EnrichmentStage>,
        invoker: Arc<dyn AgentInvoker>,
        sessions: Arc<SessionRegistry>,
        delivery: Arc<DeliveryService>,
        archive: Option<Arc<ArchiveStore>>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let cancel = CancellationToken::new();
        Self {
            lanes: Arc::new(DashMap::new()),
            handles: std::sync::Mutex::new(Vec::new()),
            deps: Arc::new(Worker {
                enrichment,
                invoker,
                sessions,
                delivery,
                archive,
                semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
                logs_dir: config.logs_dir,
                default_project_key: config.default_project_key,
                reenrich_on_replay: config.reenrich_on_replay,
                cancel: cancel.clone(),
            }),
            shutdown_tx,
            shutdown_grace: config.shutdown_grace,
            cancel,
        }
    }

    /// Enqueues `job` onto its session's lane, spawning the lane's drain
    /// task on first use (spec §4.6).
    #[instrument(skip(self, job), fields(chat_id = %job.chat_id))]
    pub async fn enqueue_for_project(&self, job: JobDescriptor, project_key: String) -> Result<()> {
        self.enqueue_job(QueuedJob::fresh(job), project_key).await
    }

    async fn enqueue_job(&self, job: QueuedJob, project_key: String) -> Result<()> {
        let lane_key = format!("{project_key}:{}", job.job.chat_id);

        let tx = {
            if let Some(existing) = self.lanes.get(&lane_key) {
                existing.clone()
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                self.lanes.insert(lane_key.clone(), tx.clone());
                let handle = self.spawn_lane(lane_key.clone(), project_key, rx);
                self.handles.lock().unwrap().push(handle);
                tx
            }
        };

        if tx.send(job).is_err() {
            warn!(lane = %lane_key, "lane task gone, dropping job");
        }
        Ok(())
    }

    fn spawn_lane(
        &self,
        lane_key: String,
        project_key: String,
        mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    ) -> tokio::task::JoinHandle<()> {
        let deps = self.deps.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    job = rx.recv() => {
                        match job {
                            Some(job) => {
                                let _permit = deps.semaphore.acquire().await.expect("semaphore never closed");
                                if let Err(e) = deps.process(&project_key, job).await {
                                    error!(lane = %lane_key, error = %e, "job pipeline failed");
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(lane = %lane_key, "lane draining before shutdown");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Broadcasts shutdown to every lane and waits up to `shutdown_grace`
    /// for them to drain their current job; once the grace period elapses,
    /// cancels every in-flight job's suspension points and aborts whatever
    /// lane tasks are still running (spec §4.6).
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let drain = futures_util::future::join_all(handles);
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!("shutdown grace period elapsed, cancelling and aborting in-flight work");
            self.cancel.cancel();
            for handle in abort_handles {
                handle.abort();
            }
        }
    }
}

#[async_trait::async_trait]
impl JobSink for JobQueue {
    async fn enqueue(&self, job: JobDescriptor) -> bridge_ingest::Result<()> {
        let project_key = self.deps.default_project_key.clone();
        self.enqueue_job(QueuedJob::fresh(job), project_key)
            .await
            .map_err(|e| bridge_ingest::IngestError::EnqueueFailed(e.to_string()))
    }
}

/// Lets the gateway hand an `Arc<JobQueue>` straight to `IngestHandler`
/// without a wrapper type — the queue is shared with shutdown teardown too.
#[async_trait::async_trait]
impl JobSink for Arc<JobQueue> {
    async fn enqueue(&self, job: JobDescriptor) -> bridge_ingest::Result<()> {
        JobSink::enqueue(self.as_ref(), job).await
    }
}

impl Worker {
    /// One job through the full pipeline (spec §4.6 steps 1-6): route the
    /// session, enrich, invoke the agent while streaming tool events to the
    /// per-session log, deliver the reply, and update session bookkeeping.
    /// A fatal agent error transitions the session to `failed`; every other
    /// step's errors are propagated — at-least-once delivery is the
    /// delivery subsystem's job, not this one's (spec §4.7).
    async fn process(&self, project_key: &str, queued: QueuedJob) -> Result<()> {
        let QueuedJob { job, replayed } = queued;
        let now = now_epoch_seconds();

        let outcome = self
            .sessions
            .route(project_key, &job.chat_id, &job.sender, &job.text, now)
            .await?;
        let mut session = outcome.session;

        self.archive_inbound(&job, &session.session_id).await;

        let skip_enrichment =
            replayed && self.reenrich_on_replay == bridge_core::config::ReenrichPolicy::Skip;
        let enriched_text = if skip_enrichment {
            job.text.clone()
        } else {
            tokio::select! {
                text = self.enrichment.enrich(&job) => text,
                _ = self.cancel.cancelled() => {
                    warn!(session_id = %session.session_id, "job aborted during enrichment by shutdown");
                    return Ok(());
                }
            }
        };

        let (tool_tx, mut tool_rx) = mpsc::unbounded_channel();
        let logs_dir = self.logs_dir.clone();
        let session_id_for_log = session.session_id.clone();
        let log_task = tokio::spawn(async move {
            let mut tool_calls = 0u64;
            while let Some(event) = tool_rx.recv().await {
                if let bridge_agent::ToolEvent::PostToolUse { .. } = &event {
                    tool_calls += 1;
                }
                if let Err(e) = append_tool_event(&logs_dir, &session_id_for_log, &event) {
                    error!(session_id = %session_id_for_log, error = %e, "failed to append tool-use log line");
                }
            }
            tool_calls
        });

        let request = AgentRequest {
            session_id: session.session_id.clone(),
            chat_id: job.chat_id.clone(),
            sender: job.sender.clone(),
            enriched_text,
        };

        let invocation = tokio::select! {
            r = self.invoker.invoke(request, tool_tx) => r,
            _ = self.cancel.cancelled() => {
                warn!(session_id = %session.session_id, "job aborted during agent invocation by shutdown");
                log_task.abort();
                return Ok(());
            }
        };
        let tool_calls = log_task.await.unwrap_or(0);

        match invocation {
            Ok(response) => {
                tokio::select! {
                    r = self.delivery.deliver(
                        &job.chat_id,
                        Some(job.message_id),
                        &response.text,
                        Some(&session.session_id),
                    ) => r?,
                    _ = self.cancel.cancelled() => {
                        warn!(session_id = %session.session_id, "job aborted during delivery by shutdown");
                        return Ok(());
                    }
                }
                self.sessions
                    .record_tool_calls(&mut session, tool_calls, now_epoch_seconds())
                    .await?;
            }
            Err(bridge_agent::AgentError::Cancelled) => {
                warn!(session_id = %session.session_id, "job cancelled, session left as-is");
            }
            Err(e @ bridge_agent::AgentError::Fatal(_)) => {
                error!(session_id = %session.session_id, error = %e, "fatal agent error, failing session");
                self.sessions
                    .record_tool_calls(&mut session, tool_calls, now_epoch_seconds())
                    .await?;
                self.sessions
                    .emit_event(
                        "session_failed",
                        &session,
                        serde_json::json!({ "error": e.to_string(), "message_id": job.message_id }),
                    )
                    .await;
                self.sessions
                    .transition_status(session, SessionStatus::Failed)
                    .await?;
            }
        }

        Ok(())
    }

    /// Mirrors an inbound message into the durable archive before it enters
    /// enrichment (spec §3 Message: "Created on both inbound receipt and
    /// outbound delivery"). Best-effort: a failure here never blocks the
    /// pipeline — the in-memory job still carries everything downstream
    /// needs.
    async fn archive_inbound(&self, job: &JobDescriptor, session_id: &str) {
        let Some(archive) = &self.archive else { return };

        let outcome = archive
            .store(bridge_archive::NewMessage {
                chat_id: job.chat_id.clone(),
                message_id: job.message_id,
                direction: MessageDirection::In,
                sender: job.sender.clone(),
                content: job.text.clone(),
                timestamp: job.timestamp,
                message_type: if job.has_media { MessageType::Media } else { MessageType::Text },
                session_id: Some(session_id.to_string()),
            })
            .await;

        if let Err(e) = outcome {
            warn!(chat_id = %job.chat_id, error = %e, "failed to archive inbound message");
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
    use async_trait::async_trait;
    use bridge_agent::{AgentResponse, ToolEvent};
    use bridge_deadletter::DeadLetterStore;
    use bridge_enrichment::{NoopLinkSummaryProvider, NoopMediaProvider, NoopYoutubeProvider};
    use bridge_ingest::JobDescriptor;
    use bridge_kv::{KvStore, Namespace};
    use bridge_sessions::{Classifier, KeywordClassifier};
    use bridge_transport::{MessageHandler, Transport, TransportMessage};

    struct NoopTransport;

    #[async_trait]
    impl Transport for NoopTransport {
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

    struct ToolCallingInvoker;

    #[async_trait]
    impl AgentInvoker for ToolCallingInvoker {
        async fn invoke(
            &self,
            request: AgentRequest,
            tool_events: mpsc::UnboundedSender<ToolEvent>,
        ) -> bridge_agent::Result<AgentResponse> {
            let _ = tool_events.send(ToolEvent::PreToolUse {
                tool_name: "bash".to_string(),
                start_time: 1.0,
                tool_input: serde_json::json!({"command": "echo hi"}),
            });
            let _ = tool_events.send(ToolEvent::PostToolUse {
                tool_name: "bash".to_string(),
                end_time: 2.0,
                tool_output_preview: "hi".to_string(),
            });
            Ok(AgentResponse {
                text: format!("handled: {}", request.enriched_text),
            })
        }
    }

    async fn test_kv() -> KvStore {
        KvStore::connect("redis://127.0.0.1:6379", Namespace::Test)
            .await
            .expect("redis must be reachable for this test")
    }

    #[tokio::test]
    #[ignore = "requires a local redis instance"]
    async fn processes_a_job_end_to_end_and_writes_tool_log() {
        let kv = test_kv().await;
        kv.flush_namespace().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier);
        let sessions = Arc::new(SessionRegistry::new(kv.clone(), classifier, 600));
        let transport: Arc<dyn Transport> = Arc::new(NoopTransport);
        let enrichment = Arc::new(EnrichmentStage::new(
            Arc::new(NoopMediaProvider),
            Arc::new(NoopYoutubeProvider),
            Arc::new(NoopLinkSummaryProvider),
            transport.clone(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let delivery = Arc::new(DeliveryService::new(
            transport,
            DeadLetterStore::new(kv),
            4_096,
            3,
        ));

        let queue = JobQueue::new(
            QueueConfig {
                worker_concurrency: 4,
                default_project_key: "proj".to_string(),
                logs_dir: dir.path().to_path_buf(),
                reenrich_on_replay: bridge_core::config::ReenrichPolicy::Skip,
                shutdown_grace: Duration::from_secs(1),
            },
            enrichment,
            Arc::new(ToolCallingInvoker),
            sessions,
            delivery,
        );

        queue
            .enqueue_for_project(
                JobDescriptor {
                    chat_id: "100".to_string(),
                    message_id: 1,
                    sender: "tom".to_string(),
                    text: "hello".to_string(),
                    has_media: false,
                    reply_to: None,
                    youtube_urls: Vec::new(),
                    other_urls: Vec::new(),
                    timestamp: 1.0,
                },
                "proj".to_string(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        queue.shutdown().await;

        let entries = std::fs::read_dir(dir.path().join("sessions")).unwrap();
        assert_eq!(entries.count(), 1, "expected exactly one session log directory");
    }
}
