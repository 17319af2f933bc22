use bridge_ingest::JobDescriptor;

/// A job as it sits in a session lane's queue: the descriptor plus whether
/// it was re-enqueued from a crash-recovery replay rather than a fresh
/// inbound event (spec §9 Open Question — `replayed` gates whether
/// enrichment re-runs).
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: JobDescriptor,
    pub replayed: bool,
}

impl QueuedJob {
    pub fn fresh(job: JobDescriptor) -> Self {
        Self {
            job,
            replayed: false,
        }
    }
}

/// Tunables the worker pool is constructed with (spec §4.6, §6 config
/// table). Distinct from `bridge_core::BridgeConfig` so this crate only
/// depends on the fields it actually consumes.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Upper bound on jobs executing concurrently across all sessions.
    pub worker_concurrency: usize,
    /// Project every routed session belongs to (spec §6 Non-goals: a
    /// single project per deployment).
    pub default_project_key: String,
    /// Root directory for per-session `tool_use.jsonl` logs.
    pub logs_dir: std::path::PathBuf,
    /// Whether a replayed job re-runs enrichment (`Retry`) or reuses the
    /// persisted raw text unchanged (`Skip`).
    pub reenrich_on_replay: bridge_core::config::ReenrichPolicy,
    /// How long shutdown waits for in-flight lanes before abandoning them.
    pub shutdown_grace: std::time::Duration,
}
