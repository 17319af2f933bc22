use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A message as delivered by a transport's `on_message` callback (spec §6
/// Transport API). Transport-agnostic: concrete adapters (e.g.
/// `bridge-telegram`) build this from their own wire format. Kept separate
/// from `bridge-ingest::RawEvent` so this crate never depends on the
/// ingestion pipeline — conversion happens in the adapter that depends on
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: String,
    pub message_id: i64,
    pub sender: String,
    pub text: String,
    pub has_media: bool,
    pub reply_to: Option<i64>,
    pub timestamp: f64,
}

/// A previously-sent message fetched back through a transport, used by the
/// reply-chain enrichment step to walk `reply_to` links (spec §4.4 step d).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    pub message_id: i64,
    pub sender: String,
    pub text: String,
    pub timestamp: f64,
    pub reply_to: Option<i64>,
}

/// Callback registered via `Transport::on_message`. Boxed rather than
/// generic so a `Transport` trait object can hold one.
pub type MessageHandler =
    Arc<dyn Fn(InboundEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The boundary between the bridge and a concrete chat platform (spec §6).
/// Implementations own their own reconnect/backoff behaviour; callers only
/// see `connect`/`disconnect` and the two RPCs below.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the underlying connection and starts delivering inbound
    /// events to the handler registered via `on_message`.
    async fn connect(&self) -> Result<()>;

    /// Cleanly tears down the connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Sends `text` to `chat_id`, optionally threaded as a reply to
    /// `reply_to`. Returns the platform message id of the sent message.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64>;

    /// Fetches previously-sent messages by id, best-effort: ids the
    /// platform no longer has (deleted, expired, out of retention) are
    /// simply absent from the result rather than causing an error.
    async fn get_messages(&self, chat_id: &str, ids: &[i64]) -> Result<Vec<TransportMessage>>;

    /// Registers the callback invoked for every inbound event. Must be
    /// called before `connect`.
    fn on_message(&self, handler: MessageHandler);
}
