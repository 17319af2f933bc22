use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{AgentRequest, AgentResponse, ToolEvent};

/// The seam between the job queue and whatever actually runs the agent. The
/// model call, its tools, and system-prompt text are explicitly out of
/// scope; this trait only fixes the contract the worker drives: invoke with
/// enriched text, stream tool events as they occur, return the final reply.
///
/// Implementations MUST emit tool events in occurrence order and MUST
/// respect cancellation of `request`'s associated task — every suspension
/// point inside `invoke` should be cancel-safe.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: AgentRequest,
        tool_events: mpsc::UnboundedSender<ToolEvent>,
    ) -> Result<AgentResponse>;
}

/// Echoes the enriched text back unchanged and emits no tool events.
///
/// The real model call, its tools, and its system prompt are out of scope
/// for this bridge (spec §1); this stands in for it so the worker pool,
/// delivery, and session lifecycle can be wired and exercised end to end
/// without a model backend.
pub struct EchoAgentInvoker;

#[async_trait]
impl AgentInvoker for EchoAgentInvoker {
    async fn invoke(
        &self,
        request: AgentRequest,
        _tool_events: mpsc::UnboundedSender<ToolEvent>,
    ) -> Result<AgentResponse> {
        Ok(AgentResponse {
            text: request.enriched_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_invoker_returns_enriched_text_unchanged() {
        let invoker = EchoAgentInvoker;
        let (tx, _rx) = mpsc::unbounded_channel();
        let response = invoker
            .invoke(
                AgentRequest {
                    session_id: "s1".to_string(),
                    chat_id: "c1".to_string(),
                    sender: "tom".to_string(),
                    enriched_text: "hello".to_string(),
                },
                tx,
            )
            .await
            .unwrap();
        assert_eq!(response.text, "hello");
    }
}
