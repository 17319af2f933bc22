use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{Message, Request, Response, ServerHealth, ToolCapability};

/// A pluggable tool-bus target the orchestrator routes requests to (spec
/// §4.9). Servers are stateless from the orchestrator's perspective — all
/// per-request context arrives in `Request::context`.
#[async_trait]
pub trait McpServer: Send + Sync {
    /// Stable type tag used by default routing (e.g. `"project_management"`,
    /// `"telegram_tools"`).
    fn server_type(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        Vec::new()
    }

    /// Handles a routed request, including the orchestrator's own
    /// `"health_check"` probe method — implementers answer it with a
    /// `result` of `{"healthy": bool, "health_score": number}`.
    async fn handle_request(&self, request: &Request) -> Response;

    /// Handles an inter-server message addressed to this server. The
    /// default is "no handler for this message type", which the original
    /// orchestrator treats as a successful, silent delivery.
    async fn handle_message(&self, _message: &Message) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Everything the orchestrator tracks about one registered server (spec
/// §4.9 `ServerRegistration`).
pub struct ServerRegistration {
    pub server_name: String,
    pub server_type: String,
    pub version: String,
    pub capabilities: Vec<ToolCapability>,
    pub health_status: ServerHealth,
    pub last_health_check: Option<f64>,
    pub registered_at: f64,
    pub last_activity: f64,
    pub instance: Arc<dyn McpServer>,
}
