use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use bridge_agent::ToolEvent;

/// Path to a session's tool-use log: `{logs_dir}/sessions/{session_id}/tool_use.jsonl`
/// (spec §4.6, §6 bit-exact schema).
pub fn tool_use_log_path(logs_dir: &Path, session_id: &str) -> PathBuf {
    logs_dir.join("sessions").join(session_id).join("tool_use.jsonl")
}

/// Appends one JSON line per event and flushes after every write, so a
/// watchdog scan or a crash mid-session never observes a half-written line
/// (spec §4.6, §4.8).
pub fn append_tool_event(logs_dir: &Path, session_id: &str, event: &ToolEvent) -> std::io::Result<()> {
    let path = tool_use_log_path(logs_dir, session_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(event).expect("ToolEvent always serializes");
    writeln!(file, "{line}")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn appends_one_flushed_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let event = ToolEvent::PreToolUse {
            tool_name: "bash".to_string(),
            start_time: 1.0,
            tool_input: serde_json::json!({"command": "ls"}),
        };

        append_tool_event(dir.path(), "session-1", &event).unwrap();
        append_tool_event(dir.path(), "session-1", &event).unwrap();

        let path = tool_use_log_path(dir.path(), "session-1");
        let lines: Vec<String> = std::io::BufReader::new(std::fs::File::open(path).unwrap())
            .lines()
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"pre_tool_use\""));
    }
}
