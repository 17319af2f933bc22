pub use bridge_kv::{AgentSessionRecord, ClassificationType, SessionStatus};

/// Outcome of `SessionRegistry::route` (spec §4.5).
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub session: AgentSessionRecord,
    /// `true` if an existing session was resumed, `false` if a new one was
    /// spawned.
    pub resumed: bool,
}
