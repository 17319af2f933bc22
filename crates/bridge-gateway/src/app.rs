use std::sync::Arc;

use axum::{routing::get, Router};

use bridge_mcp::McpOrchestrator;
use bridge_sessions::SessionRegistry;

/// Shared state for the liveness endpoint. The chat pipeline itself has no
/// HTTP surface (spec §1 Non-goals: web/UI integrations are out of scope);
/// `/health` is ops-facing infrastructure, not a product surface.
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub mcp: Arc<McpOrchestrator>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
}
