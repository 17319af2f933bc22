use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health — liveness probe: process metadata plus a cheap read of
/// active session count and MCP orchestrator stats. Never touches the
/// archive or KV store, so it stays fast even under load.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let active_sessions = state.sessions.active_sessions().await.map(|s| s.len()).unwrap_or(0);
    let mcp = state.mcp.stats();

    Json(json!({
        "status": "ok",
        "git_sha": env!("BRIDGE_GIT_SHA"),
        "active_sessions": active_sessions,
        "mcp": {
            "registered_servers": mcp.registered_servers,
            "requests_routed": mcp.requests_routed,
            "health_checks_performed": mcp.health_checks_performed,
        },
    }))
}
