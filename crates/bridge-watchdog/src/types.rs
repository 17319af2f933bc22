/// Severity of a health assessment (spec §4.8): `Critical` when two or more
/// signals fire at once, `Warning` for exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of assessing one session (spec §4.8). Empty `issues` means the
/// session is healthy and no alert is sent.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub issues: Vec<String>,
    pub severity: Severity,
}

impl Assessment {
    pub fn healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Tunables the watchdog is constructed with (spec §4.8, §6 config table).
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub interval_seconds: u64,
    pub silence_threshold_seconds: u64,
    pub duration_threshold_seconds: u64,
    pub loop_threshold: usize,
    pub error_cascade_threshold: usize,
    pub error_cascade_window: usize,
    pub alert_cooldown_seconds: u64,
    pub logs_dir: std::path::PathBuf,
}
