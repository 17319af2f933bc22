use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use bridge_kv::AgentSessionRecord;
use bridge_sessions::SessionRegistry;
use bridge_transport::Transport;

use crate::signals::{detect_error_cascade, detect_repetition, read_recent_tool_calls};
use crate::types::{Assessment, Severity, WatchdogConfig};

/// Number of trailing tool-use log lines read per session per scan. The
/// original reads the last 50 lines; the looping/cascade windows are
/// bounded well inside that, so 50 always gives both detectors enough
/// history.
const TOOL_CALL_READ_LIMIT: usize = 50;

/// Periodic session health scan (spec §4.8). Read-only with respect to
/// session state: it never mutates an `AgentSession`, only raises alerts
/// over `transport`.
pub struct Watchdog {
    sessions: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    config: WatchdogConfig,
    last_alert: Mutex<HashMap<String, f64>>,
}

impl Watchdog {
    pub fn new(sessions: Arc<SessionRegistry>, transport: Arc<dyn Transport>, config: WatchdogConfig) -> Self {
        Self {
            sessions,
            transport,
            config,
            last_alert: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the scan loop until `shutdown` broadcasts `true` (spec §4.8,
    /// same `watch`-based shutdown idiom as the job queue's lanes).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval = self.config.interval_seconds, "watchdog started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.interval_seconds));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!(error = %e, "watchdog scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("watchdog shutting down");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn scan_once(&self) -> crate::error::Result<()> {
        let sessions = self.sessions.active_sessions().await?;
        let mut healthy = 0;
        let mut with_issues = 0;
        let now = now_epoch_seconds();

        for session in &sessions {
            let assessment = assess_session(session, &self.config, now);
            if assessment.healthy() {
                healthy += 1;
                continue;
            }
            with_issues += 1;
            warn!(
                session_id = %session.session_id,
                severity = %assessment.severity,
                issues = ?assessment.issues,
                "session has health issues"
            );
            self.send_alert(session, &assessment, now).await;
        }

        info!(checked = sessions.len(), healthy, with_issues, "watchdog scan complete");
        Ok(())
    }

    async fn send_alert(&self, session: &AgentSessionRecord, assessment: &Assessment, now: f64) {
        {
            let mut cooldowns = self.last_alert.lock().unwrap();
            if let Some(&last) = cooldowns.get(&session.session_id) {
                if now - last < self.config.alert_cooldown_seconds as f64 {
                    return;
                }
            }
            cooldowns.insert(session.session_id.clone(), now);
        }

        let message = format_alert(session, assessment, now);
        if let Err(e) = self.transport.send_message(&session.chat_id, &message, None).await {
            error!(session_id = %session.session_id, error = %e, "failed to send watchdog alert");
        }
    }
}

/// Assesses one session's health (spec §4.8): silence, duration, looping,
/// and error cascade are independent signals; severity is `critical` when
/// two or more fire, else `warning`. Pure function of `session`/`config`/
/// `now` plus the session's tool-use log, so it is testable without a live
/// `KvStore` or `Transport`.
fn assess_session(session: &AgentSessionRecord, config: &WatchdogConfig, now: f64) -> Assessment {
    let mut issues = Vec::new();

    let silence = now - session.last_activity;
    if silence > config.silence_threshold_seconds as f64 {
        issues.push(format!("Silent for {} minutes", (silence / 60.0) as i64));
    }

    let duration = now - session.started_at;
    if duration > config.duration_threshold_seconds as f64 {
        issues.push(format!("Running for {} hours", (duration / 3600.0) as i64));
    }

    let tool_calls = read_recent_tool_calls(&config.logs_dir, &session.session_id, TOOL_CALL_READ_LIMIT);
    if !tool_calls.is_empty() {
        let (is_looping, repeated_tool, count) = detect_repetition(&tool_calls, config.loop_threshold);
        if is_looping {
            issues.push(format!(
                "Looping: {} called {} times consecutively",
                repeated_tool.unwrap_or_else(|| "unknown".to_string()),
                count
            ));
        }

        let (is_cascading, error_count) =
            detect_error_cascade(&tool_calls, config.error_cascade_threshold, config.error_cascade_window);
        if is_cascading {
            issues.push(format!(
                "Error cascade: {error_count} errors in last {} calls",
                config.error_cascade_window
            ));
        }
    }

    let severity = if issues.len() >= 2 {
        Severity::Critical
    } else {
        Severity::Warning
    };

    Assessment { issues, severity }
}

/// Formats a health alert (spec §4.8): emoji-free, plain `critical`/
/// `warning` severity text, matching the original's content bit-for-bit
/// minus the platform-specific emoji.
fn format_alert(session: &AgentSessionRecord, assessment: &Assessment, now: f64) -> String {
    let session_id_short = &session.session_id[..8.min(session.session_id.len())];
    let duration = now - session.started_at;
    let hours = (duration / 3600.0) as i64;
    let minutes = ((duration % 3600.0) / 60.0) as i64;
    let duration_str = if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    };

    let issues_formatted = assessment
        .issues
        .iter()
        .map(|issue| format!("- {issue}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "[{severity}] Session Health Alert\n\nSession: {session_id_short}\nProject: {project_key}\nDuration: {duration_str}\nTool calls: {tool_call_count}\n\nIssues:\n{issues_formatted}",
        severity = assessment.severity.to_string().to_uppercase(),
        project_key = session.project_key,
        tool_call_count = session.tool_call_count,
    )
}

fn now_epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_kv::{ClassificationType, SessionStatus};

    fn session(started_at: f64, last_activity: f64) -> AgentSessionRecord {
        AgentSessionRecord {
            session_id: "0123456789abcdef".to_string(),
            project_key: "proj".to_string(),
            status: SessionStatus::Active,
            chat_id: "100".to_string(),
            sender: "tom".to_string(),
            started_at,
            last_activity,
            tool_call_count: 3,
            branch_name: None,
            work_item_slug: None,
            message_text: "hello".to_string(),
            classification_type: Some(ClassificationType::Bug),
            classification_confidence: Some(0.5),
        }
    }

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            interval_seconds: 300,
            silence_threshold_seconds: 600,
            duration_threshold_seconds: 7_200,
            loop_threshold: 5,
            error_cascade_threshold: 5,
            error_cascade_window: 20,
            alert_cooldown_seconds: 1_800,
            logs_dir: std::path::PathBuf::from("/tmp/bridge-watchdog-test-nonexistent"),
        }
    }

    #[test]
    fn healthy_session_has_no_issues() {
        let now = 10_000.0;
        let s = session(now - 100.0, now - 50.0);
        let assessment = assess_session(&s, &config(), now);
        assert!(assessment.healthy());
        assert_eq!(assessment.severity, Severity::Warning);
    }

    #[test]
    fn silence_alone_is_a_warning() {
        let now = 10_000.0;
        let s = session(now - 100.0, now - 700.0);
        let assessment = assess_session(&s, &config(), now);
        assert_eq!(assessment.issues.len(), 1);
        assert!(assessment.issues[0].contains("Silent for"));
        assert_eq!(assessment.severity, Severity::Warning);
    }

    #[test]
    fn silence_and_duration_together_are_critical() {
        let now = 10_000.0;
        let s = session(now - 8_000.0, now - 700.0);
        let assessment = assess_session(&s, &config(), now);
        assert_eq!(assessment.issues.len(), 2);
        assert_eq!(assessment.severity, Severity::Critical);
    }

    #[test]
    fn alert_message_is_emoji_free_and_includes_issues() {
        let now = 10_000.0;
        let mut s = session(now - 8_000.0, now - 700.0);
        s.tool_call_count = 7;
        let assessment = Assessment {
            issues: vec!["Silent for 11 minutes".to_string(), "Running for 2 hours".to_string()],
            severity: Severity::Critical,
        };
        let message = format_alert(&s, &assessment, now);
        assert!(message.contains("CRITICAL"));
        assert!(message.contains("Session: 01234567"));
        assert!(message.contains("Tool calls: 7"));
        assert!(message.contains("- Silent for 11 minutes"));
        assert!(!message.contains('\u{1F6A8}'));
    }
}
