use std::sync::Arc;
use std::time::Duration;

use bridge_ingest::JobDescriptor;
use bridge_transport::Transport;
use tracing::{instrument, warn};

use crate::providers::{LinkSummaryProvider, MediaProvider, YoutubeProvider};

/// Reply-chain traversal never walks more than this many parent messages
/// (spec §4.4 step 4).
pub const MAX_REPLY_CHAIN_DEPTH: usize = 20;

const LINK_SUMMARIES_MARKER: &str = "--- LINK SUMMARIES ---";

/// Runs the four enrichment sub-steps in the fixed splice order
/// media → YouTube → links → reply chain (spec §4.4). Each sub-step is
/// independently guarded: a failing or timed-out sub-step is logged and
/// skipped, never aborting the others.
pub struct EnrichmentStage {
    media: Arc<dyn MediaProvider>,
    youtube: Arc<dyn YoutubeProvider>,
    links: Arc<dyn LinkSummaryProvider>,
    transport: Arc<dyn Transport>,
    per_step_timeout: Duration,
    stage_budget: Duration,
}

impl EnrichmentStage {
    pub fn new(
        media: Arc<dyn MediaProvider>,
        youtube: Arc<dyn YoutubeProvider>,
        links: Arc<dyn LinkSummaryProvider>,
        transport: Arc<dyn Transport>,
        per_step_timeout: Duration,
        stage_budget: Duration,
    ) -> Self {
        Self {
            media,
            youtube,
            links,
            transport,
            per_step_timeout,
            stage_budget,
        }
    }

    /// Produces the enriched text for `job`. Never fails: if every sub-step
    /// fails or times out, the job's original text is returned unchanged.
    #[instrument(skip(self, job), fields(chat_id = %job.chat_id, message_id = job.message_id))]
    pub async fn enrich(&self, job: &JobDescriptor) -> String {
        match tokio::time::timeout(self.stage_budget, self.enrich_inner(job)).await {
            Ok(text) => text,
            Err(_) => {
                warn!("enrichment stage exceeded its overall time budget, using raw text");
                job.text.clone()
            }
        }
    }

    async fn enrich_inner(&self, job: &JobDescriptor) -> String {
        let mut text = job.text.clone();

        if job.has_media {
            if let Some(media_text) = self.run_media(job).await {
                text = format!("{media_text}\n\n{text}");
            }
        }

        for url in &job.youtube_urls {
            if let Some(transcript) = self.run_youtube(url).await {
                text = format!("{text}\n\n[YouTube transcript for {url}]\n{transcript}");
            }
        }

        if !job.other_urls.is_empty() {
            let mut summaries = Vec::new();
            for url in &job.other_urls {
                if let Some(summary) = self.run_link_summary(url).await {
                    summaries.push(format!("{url}: {summary}"));
                }
            }
            if !summaries.is_empty() {
                text = format!(
                    "{text}\n\n{LINK_SUMMARIES_MARKER}\n{}",
                    summaries.join("\n")
                );
            }
        }

        if let Some(chain) = self.run_reply_chain(job).await {
            text = format!("{chain}\n\n---\n\n{text}");
        }

        text
    }

    async fn run_media(&self, job: &JobDescriptor) -> Option<String> {
        let fut = self.media.describe(&job.chat_id, job.message_id);
        match tokio::time::timeout(self.per_step_timeout, fut).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "media enrichment failed, skipping");
                None
            }
            Err(_) => {
                warn!("media enrichment timed out, skipping");
                None
            }
        }
    }

    async fn run_youtube(&self, url: &str) -> Option<String> {
        let fut = self.youtube.transcript(url);
        match tokio::time::timeout(self.per_step_timeout, fut).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, url, "youtube enrichment failed, skipping");
                None
            }
            Err(_) => {
                warn!(url, "youtube enrichment timed out, skipping");
                None
            }
        }
    }

    async fn run_link_summary(&self, url: &str) -> Option<String> {
        let fut = self.links.summarize(url);
        match tokio::time::timeout(self.per_step_timeout, fut).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, url, "link summary failed, skipping");
                None
            }
            Err(_) => {
                warn!(url, "link summary timed out, skipping");
                None
            }
        }
    }

    /// Walks `reply_to` links up to `MAX_REPLY_CHAIN_DEPTH` parents, oldest
    /// first, and renders them as a single context block.
    async fn run_reply_chain(&self, job: &JobDescriptor) -> Option<String> {
        let Some(first_parent) = job.reply_to else {
            return None;
        };

        let fut = self.walk_reply_chain(&job.chat_id, first_parent);
        let lines = match tokio::time::timeout(self.per_step_timeout, fut).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                warn!(error = %e, "reply chain traversal failed, skipping");
                return None;
            }
            Err(_) => {
                warn!("reply chain traversal timed out, skipping");
                return None;
            }
        };

        if lines.is_empty() {
            return None;
        }

        let mut lines = lines;
        lines.reverse();
        Some(format!("[Reply chain context]\n{}", lines.join("\n")))
    }

    async fn walk_reply_chain(
        &self,
        chat_id: &str,
        first_parent: i64,
    ) -> bridge_transport::Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut next = Some(first_parent);

        for _ in 0..MAX_REPLY_CHAIN_DEPTH {
            let Some(id) = next else { break };
            let found = self.transport.get_messages(chat_id, &[id]).await?;
            let Some(msg) = found.into_iter().next() else {
                break;
            };
            lines.push(format!("{}: {}", msg.sender, msg.text));
            next = msg.reply_to;
        }

        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{NoopLinkSummaryProvider, NoopMediaProvider, NoopYoutubeProvider};
    use async_trait::async_trait;
    use bridge_transport::{InboundEvent, MessageHandler, TransportMessage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubTransport {
        messages: Mutex<HashMap<i64, TransportMessage>>,
    }

    #[async_trait]
    impl Transport for StubTransport {
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
            Ok(0)
        }
        async fn get_messages(
            &self,
            _chat_id: &str,
            ids: &[i64],
        ) -> bridge_transport::Result<Vec<TransportMessage>> {
            let messages = self.messages.lock().unwrap();
            Ok(ids.iter().filter_map(|id| messages.get(id).cloned()).collect())
        }
        fn on_message(&self, _handler: MessageHandler) {}
    }

    fn job(text: &str) -> JobDescriptor {
        JobDescriptor {
            chat_id: "100".to_string(),
            message_id: 1,
            sender: "tom".to_string(),
            text: text.to_string(),
            has_media: false,
            reply_to: None,
            youtube_urls: Vec::new(),
            other_urls: Vec::new(),
            timestamp: 1.0,
        }
    }

    fn stage(transport: Arc<dyn Transport>) -> EnrichmentStage {
        EnrichmentStage::new(
            Arc::new(NoopMediaProvider),
            Arc::new(NoopYoutubeProvider),
            Arc::new(NoopLinkSummaryProvider),
            transport,
            Duration::from_secs(5),
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn no_op_providers_leave_text_unchanged() {
        let transport = Arc::new(StubTransport {
            messages: Mutex::new(HashMap::new()),
        });
        let s = stage(transport);
        let out = s.enrich(&job("hello")).await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn reply_chain_is_prepended_oldest_first() {
        let mut messages = HashMap::new();
        messages.insert(
            2,
            TransportMessage {
                message_id: 2,
                sender: "alice".to_string(),
                text: "first question".to_string(),
                timestamp: 1.0,
                reply_to: None,
            },
        );
        let transport = Arc::new(StubTransport {
            messages: Mutex::new(messages),
        });
        let s = stage(transport);

        let mut j = job("my answer");
        j.reply_to = Some(2);

        let out = s.enrich(&j).await;
        assert!(out.starts_with("[Reply chain context]\nalice: first question"));
        assert!(out.ends_with("my answer"));
    }

    #[tokio::test]
    async fn reply_chain_stops_at_missing_parent() {
        let transport = Arc::new(StubTransport {
            messages: Mutex::new(HashMap::new()),
        });
        let s = stage(transport);

        let mut j = job("hi");
        j.reply_to = Some(99);

        let out = s.enrich(&j).await;
        assert_eq!(out, "hi");
    }
}
