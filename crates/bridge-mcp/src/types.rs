use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health classification of a registered server (spec §4.9). `Unknown`
/// covers both "never probed yet" and "the last probe itself errored".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl std::fmt::Display for ServerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerHealth::Healthy => "healthy",
            ServerHealth::Degraded => "degraded",
            ServerHealth::Unhealthy => "unhealthy",
            ServerHealth::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A tool exposed by a registered server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// A request routed through the orchestrator (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "uuid_v4")]
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub context: Option<BTreeMap<String, serde_json::Value>>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: uuid_v4(),
            method: method.into(),
            params: BTreeMap::new(),
            context: None,
        }
    }
}

fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Structured error detail carried in a failed `Response` (every failure
/// response carries a stable machine-readable `code`, spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// Routing metadata attached to every response (spec §4.9: `routed_by`,
/// `target_server`, `routing_timestamp`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseMetadata {
    pub routed_by: Option<String>,
    pub target_server: Option<String>,
    pub routing_timestamp: Option<f64>,
}

/// A response returned by a registered server or synthesized by the
/// orchestrator itself (`NO_SERVERS_AVAILABLE`, `SERVER_UNAVAILABLE`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn failed(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// One condition in a routing rule (spec §4.9). The first rule (ascending
/// `priority`) whose condition matches wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutingCondition {
    Method { values: Vec<String> },
    MethodPrefix { prefix: String },
    Parameter { name: String, value: serde_json::Value },
    Context { key: String, value: serde_json::Value },
    Always,
}

/// An ordered routing rule (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    pub condition: RoutingCondition,
    pub target_servers: Vec<String>,
    pub priority: i32,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

fn bool_true() -> bool {
    true
}

/// Priority of a queued inter-server message (spec §4.9). Derived `Ord`
/// matches the original `MessagePriority` enum ordering (`Critical` drains
/// first from the priority-ordered queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// A queued message from one registered server to another (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "uuid_v4")]
    pub message_id: String,
    pub from_server: String,
    pub to_server: String,
    pub message_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: MessagePriority,
    pub created_at: f64,
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub delivery_attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}
