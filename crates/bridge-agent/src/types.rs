use serde::{Deserialize, Serialize};

/// Everything the agent needs to produce a reply. The enriched text has
/// already absorbed media/YouTube/link/reply-chain context (spec §4.4); the
/// agent itself — model, tools, system prompt — is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub session_id: String,
    pub chat_id: String,
    pub sender: String,
    pub enriched_text: String,
}

/// The agent's final reply, handed to the delivery subsystem unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub text: String,
}

/// One line of the per-session tool-use log (spec §6, bit-exact schema).
/// Serializes to exactly the shape the spec requires — field presence
/// differs between pre/post events, so this is untagged rather than a
/// single struct with optional fields in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolEvent {
    PreToolUse {
        tool_name: String,
        start_time: f64,
        tool_input: serde_json::Value,
    },
    PostToolUse {
        tool_name: String,
        end_time: f64,
        /// Truncated to at most 2048 chars by the emitting agent invoker.
        tool_output_preview: String,
    },
}
