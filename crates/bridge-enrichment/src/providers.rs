use async_trait::async_trait;

use crate::error::Result;

/// Fetches a best-effort transcript/description for attached media (spec
/// §4.4 step 1). The model invocation and media codec details are out of
/// scope — this trait is the seam a real deployment plugs a transcription
/// backend into.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn describe(&self, chat_id: &str, message_id: i64) -> Result<Option<String>>;
}

/// Fetches a transcript/caption for a detected YouTube URL (spec §4.4 step 2).
#[async_trait]
pub trait YoutubeProvider: Send + Sync {
    async fn transcript(&self, url: &str) -> Result<Option<String>>;
}

/// Produces a short summary for a non-YouTube URL (spec §4.4 step 3).
#[async_trait]
pub trait LinkSummaryProvider: Send + Sync {
    async fn summarize(&self, url: &str) -> Result<Option<String>>;
}

/// Default media provider: no transcription backend configured, every
/// message is treated as having no derivable media context.
pub struct NoopMediaProvider;

#[async_trait]
impl MediaProvider for NoopMediaProvider {
    async fn describe(&self, _chat_id: &str, _message_id: i64) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Default YouTube provider: pass-through, no caption fetch performed.
pub struct NoopYoutubeProvider;

#[async_trait]
impl YoutubeProvider for NoopYoutubeProvider {
    async fn transcript(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Default link summary provider: pass-through, no HTTP fetch performed.
pub struct NoopLinkSummaryProvider;

#[async_trait]
impl LinkSummaryProvider for NoopLinkSummaryProvider {
    async fn summarize(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
