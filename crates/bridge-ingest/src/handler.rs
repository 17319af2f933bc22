use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::extract::{extract_urls, strip_all_mentions, strip_bot_mention};
use crate::types::{JobDescriptor, RawEvent};

/// Destination for a freshly-built job (spec §4.3 step 5: "Publish the job
/// onto the enrichment queue; return."). Implemented by `bridge-queue` in
/// the wired process; a transport-agnostic trait here keeps this crate
/// free of any dependency on the worker pool.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn enqueue(&self, job: JobDescriptor) -> Result<()>;
}

/// Transport-agnostic fast path from a raw event to an enqueued job (spec
/// §4.3). Must never block the transport's callback context — every
/// operation here is pure/local; no network calls, no agent invocation.
pub struct IngestHandler<S: JobSink> {
    sink: S,
    bot_handle: Option<String>,
}

impl<S: JobSink> IngestHandler<S> {
    pub fn new(sink: S, bot_handle: Option<String>) -> Self {
        Self { sink, bot_handle }
    }

    /// Builds a job descriptor and enqueues it. Any failure is logged and
    /// the event dropped — never propagated to the transport caller (spec
    /// §4.3 Failure policy).
    #[instrument(skip(self, event), fields(chat_id = %event.chat_id, message_id = event.message_id))]
    pub async fn handle(&self, event: RawEvent) {
        match self.build_job(&event) {
            Ok(job) => {
                if let Err(e) = self.sink.enqueue(job).await {
                    warn!(error = %e, "failed to enqueue job, dropping event");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to build job, dropping event");
            }
        }
    }

    fn build_job(&self, event: &RawEvent) -> Result<JobDescriptor> {
        let text = match &self.bot_handle {
            Some(handle) => strip_bot_mention(&event.text, handle),
            None => strip_all_mentions(&event.text),
        };
        let (youtube_urls, other_urls) = extract_urls(&text);

        Ok(JobDescriptor {
            chat_id: event.chat_id.clone(),
            message_id: event.message_id,
            sender: event.sender.clone(),
            text,
            has_media: event.has_media,
            reply_to: event.reply_to,
            youtube_urls,
            other_urls,
            timestamp: event.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        jobs: Arc<Mutex<Vec<JobDescriptor>>>,
    }

    #[async_trait]
    impl JobSink for RecordingSink {
        async fn enqueue(&self, job: JobDescriptor) -> Result<()> {
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    #[tokio::test]
    async fn builds_and_enqueues_a_job() {
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let handler = IngestHandler::new(
            RecordingSink { jobs: jobs.clone() },
            Some("agentbot".to_string()),
        );

        handler
            .handle(RawEvent {
                chat_id: "100".to_string(),
                message_id: 1,
                sender: "tom".to_string(),
                text: "@agentbot check https://youtu.be/xyz please".to_string(),
                has_media: false,
                reply_to: None,
                timestamp: 1.0,
            })
            .await;

        let jobs = jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].text, "check https://youtu.be/xyz please");
        assert_eq!(jobs[0].youtube_urls, vec!["https://youtu.be/xyz"]);
    }
}
