use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Transport single-message size limit assumed when no transport-specific
/// override is configured.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 4_096;

/// Top-level config (`~/.bridge/bridge.toml` + `BRIDGE_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_enrichment_timeout_seconds")]
    pub enrichment_timeout_seconds: u64,

    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    #[serde(default = "default_delivery_retry_max")]
    pub delivery_retry_max: u32,

    #[serde(default = "default_watchdog_interval_seconds")]
    pub watchdog_interval_seconds: u64,

    #[serde(default = "default_silence_threshold_seconds")]
    pub silence_threshold_seconds: u64,

    #[serde(default = "default_duration_threshold_seconds")]
    pub duration_threshold_seconds: u64,

    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,

    #[serde(default = "default_error_cascade_threshold")]
    pub error_cascade_threshold: usize,

    #[serde(default = "default_error_cascade_window")]
    pub error_cascade_window: usize,

    #[serde(default = "default_alert_cooldown_seconds")]
    pub alert_cooldown_seconds: u64,

    #[serde(default = "default_mcp_health_check_interval_seconds")]
    pub mcp_health_check_interval_seconds: u64,

    #[serde(default = "bool_true")]
    pub mcp_enable_inter_server_messaging: bool,

    #[serde(default = "bool_true")]
    pub mcp_enable_load_balancing: bool,

    #[serde(default = "default_kv_namespace")]
    pub kv_namespace: String,

    /// §9 Open Question: whether a replayed job re-runs enrichment or reuses
    /// whatever raw text was persisted before the crash. Defaults to `Skip`
    /// to match the observed behavior of the original bridge.
    #[serde(default)]
    pub reenrich_on_replay: ReenrichPolicy,

    /// Project/workspace a session belongs to when the deployment only ever
    /// talks to one project. Multi-project deployments are out of scope
    /// (spec §6 Non-goals); every session routes through this key.
    #[serde(default = "default_project_key")]
    pub default_project_key: String,

    /// Root directory for per-session `tool_use.jsonl` logs (spec §4.6,
    /// §6). Relative paths are resolved against the process's working
    /// directory.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Grace period the worker pool waits for in-flight jobs to finish
    /// before abandoning them on shutdown (spec §4.6).
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    /// Age at which a bridge event becomes eligible for cleanup (spec §3
    /// Bridge event: "subject to age-based cleanup (default 7 days)").
    #[serde(default = "default_bridge_event_retention_seconds")]
    pub bridge_event_retention_seconds: u64,

    /// How often the retention sweep runs.
    #[serde(default = "default_bridge_event_sweep_interval_seconds")]
    pub bridge_event_sweep_interval_seconds: u64,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub kv: KvConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            enrichment_timeout_seconds: default_enrichment_timeout_seconds(),
            max_chunk_chars: default_max_chunk_chars(),
            delivery_retry_max: default_delivery_retry_max(),
            watchdog_interval_seconds: default_watchdog_interval_seconds(),
            silence_threshold_seconds: default_silence_threshold_seconds(),
            duration_threshold_seconds: default_duration_threshold_seconds(),
            loop_threshold: default_loop_threshold(),
            error_cascade_threshold: default_error_cascade_threshold(),
            error_cascade_window: default_error_cascade_window(),
            alert_cooldown_seconds: default_alert_cooldown_seconds(),
            mcp_health_check_interval_seconds: default_mcp_health_check_interval_seconds(),
            mcp_enable_inter_server_messaging: true,
            mcp_enable_load_balancing: true,
            kv_namespace: default_kv_namespace(),
            reenrich_on_replay: ReenrichPolicy::default(),
            default_project_key: default_project_key(),
            logs_dir: default_logs_dir(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            bridge_event_retention_seconds: default_bridge_event_retention_seconds(),
            bridge_event_sweep_interval_seconds: default_bridge_event_sweep_interval_seconds(),
            database: DatabaseConfig::default(),
            kv: KvConfig::default(),
        }
    }
}

/// §9 Open Question policy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReenrichPolicy {
    #[default]
    Skip,
    Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    #[serde(default = "default_kv_url")]
    pub url: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: default_kv_url(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_worker_concurrency() -> usize {
    8
}
fn default_enrichment_timeout_seconds() -> u64 {
    120
}
fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}
fn default_delivery_retry_max() -> u32 {
    3
}
fn default_watchdog_interval_seconds() -> u64 {
    300
}
fn default_silence_threshold_seconds() -> u64 {
    600
}
fn default_duration_threshold_seconds() -> u64 {
    7_200
}
fn default_loop_threshold() -> usize {
    5
}
fn default_error_cascade_threshold() -> usize {
    5
}
fn default_error_cascade_window() -> usize {
    20
}
fn default_alert_cooldown_seconds() -> u64 {
    1_800
}
fn default_mcp_health_check_interval_seconds() -> u64 {
    30
}
fn default_kv_namespace() -> String {
    "prod".to_string()
}
fn default_project_key() -> String {
    "default".to_string()
}
fn default_logs_dir() -> String {
    "logs".to_string()
}
fn default_shutdown_grace_seconds() -> u64 {
    30
}
fn default_bridge_event_retention_seconds() -> u64 {
    7 * 86_400
}
fn default_bridge_event_sweep_interval_seconds() -> u64 {
    3_600
}
fn default_kv_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.bridge/bridge.db", home)
}

impl BridgeConfig {
    /// Load config from a TOML file with `BRIDGE_*` env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `~/.bridge/bridge.toml`
    ///
    /// Unlike the teacher's `SkynetConfig`, this struct is mostly flat
    /// (`worker_concurrency`, `silence_threshold_seconds`, …) rather than
    /// nested, so env overrides split on a double underscore rather than a
    /// single one: `BRIDGE_WORKER_CONCURRENCY` maps straight to
    /// `worker_concurrency`, while the two genuinely nested tables use
    /// `BRIDGE_DATABASE__PATH` / `BRIDGE_KV__URL`. A single-underscore split
    /// would shred every multi-word flat key into a nested dict matching no
    /// field, silently dropping the override.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: BridgeConfig = Figment::from(Self::default())
            .merge(Toml::file(&path))
            .merge(Env::prefixed("BRIDGE_").split("__"))
            .extract()
            .map_err(|e| crate::error::BridgeError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.bridge/bridge.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_enumerated_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.worker_concurrency, 8);
        assert_eq!(cfg.enrichment_timeout_seconds, 120);
        assert_eq!(cfg.max_chunk_chars, 4_096);
        assert_eq!(cfg.delivery_retry_max, 3);
        assert_eq!(cfg.watchdog_interval_seconds, 300);
        assert_eq!(cfg.silence_threshold_seconds, 600);
        assert_eq!(cfg.duration_threshold_seconds, 7_200);
        assert_eq!(cfg.loop_threshold, 5);
        assert_eq!(cfg.error_cascade_threshold, 5);
        assert_eq!(cfg.error_cascade_window, 20);
        assert_eq!(cfg.alert_cooldown_seconds, 1_800);
        assert_eq!(cfg.mcp_health_check_interval_seconds, 30);
        assert!(cfg.mcp_enable_inter_server_messaging);
        assert!(cfg.mcp_enable_load_balancing);
        assert_eq!(cfg.reenrich_on_replay, ReenrichPolicy::Skip);
        assert_eq!(cfg.default_project_key, "default");
        assert_eq!(cfg.logs_dir, "logs");
        assert_eq!(cfg.shutdown_grace_seconds, 30);
        assert_eq!(cfg.bridge_event_retention_seconds, 7 * 86_400);
        assert_eq!(cfg.bridge_event_sweep_interval_seconds, 3_600);
    }
}
