//! Periodic session health scan (spec §4.8): detects silent, overlong,
//! looping, and error-cascading sessions and raises alerts. Read-only with
//! respect to session state — it never transitions or mutates a session,
//! it only observes and alerts.

pub mod error;
pub mod monitor;
pub mod signals;
pub mod types;

pub use error::{Result, WatchdogError};
pub use monitor::Watchdog;
pub use types::{Assessment, Severity, WatchdogConfig};

/// Path to a session's tool-use log: `{logs_dir}/sessions/{session_id}/tool_use.jsonl`.
/// Mirrors `bridge_queue`'s writer-side path scheme; duplicated rather than
/// shared so this crate has no dependency on the worker pool.
pub fn tool_use_log_path(logs_dir: &std::path::Path, session_id: &str) -> std::path::PathBuf {
    logs_dir.join("sessions").join(session_id).join("tool_use.jsonl")
}
