//! Per-session FIFO job queue and bounded worker pool (spec §4.6).
//!
//! Jobs for the same `(project_key, chat_id)` pair execute strictly in
//! arrival order through a dedicated lane task; jobs for different pairs
//! run concurrently up to `worker_concurrency`. Each job's pipeline is
//! route session → enrich → invoke agent (streaming tool events to a
//! per-session `tool_use.jsonl`) → deliver reply → update session
//! bookkeeping.

pub mod engine;
pub mod error;
pub mod log;
pub mod types;

pub use engine::JobQueue;
pub use error::{QueueError, Result};
pub use log::{append_tool_event, tool_use_log_path};
pub use types::{QueueConfig, QueuedJob};
