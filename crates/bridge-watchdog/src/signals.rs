use std::path::Path;

use bridge_agent::ToolEvent;

/// Error substrings a post-tool-use output is checked against, lowercased
/// (spec §4.8, bit-for-bit from the original's `detect_error_cascade`).
const ERROR_INDICATORS: &[&str] = &[
    "error",
    "exception",
    "failed",
    "traceback",
    "fatal",
    "cannot",
    "not found",
    "permission denied",
];

/// Reads up to the last `limit` lines of a session's tool-use log, skipping
/// any line that fails to parse (spec §4.8: corrupted lines are silently
/// dropped, a missing file yields an empty list).
pub fn read_recent_tool_calls(logs_dir: &Path, session_id: &str, limit: usize) -> Vec<ToolEvent> {
    let path = crate::tool_use_log_path(logs_dir, session_id);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };

    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(limit);
    lines[start..]
        .iter()
        .filter_map(|line| serde_json::from_str::<ToolEvent>(line).ok())
        .collect()
}

/// A fingerprint of a pre-tool-use call: tool name plus its input, sorted
/// by key so two semantically-identical JSON objects compare equal (spec
/// §4.8, bit-for-bit from the original's `detect_repetition`).
fn fingerprint(tool_name: &str, tool_input: &serde_json::Value) -> (String, String) {
    let canonical = match tool_input {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            serde_json::to_string(&entries).unwrap_or_default()
        }
        other => other.to_string(),
    };
    (tool_name.to_string(), canonical)
}

/// Detects a stuck session: `threshold` or more consecutive identical
/// pre-tool-use fingerprints ending at the most recent call.
///
/// Returns `(is_looping, repeated_tool_name, consecutive_count)`.
pub fn detect_repetition(tool_calls: &[ToolEvent], threshold: usize) -> (bool, Option<String>, usize) {
    let fingerprints: Vec<(String, String)> = tool_calls
        .iter()
        .filter_map(|event| match event {
            ToolEvent::PreToolUse {
                tool_name,
                tool_input,
                ..
            } => Some(fingerprint(tool_name, tool_input)),
            ToolEvent::PostToolUse { .. } => None,
        })
        .collect();

    if fingerprints.len() < threshold {
        return (false, None, 0);
    }

    let last = fingerprints.last().expect("checked non-empty above");
    let mut consecutive = 1;
    for fp in fingerprints[..fingerprints.len() - 1].iter().rev() {
        if fp == last {
            consecutive += 1;
        } else {
            break;
        }
    }

    let is_looping = consecutive >= threshold;
    let repeated_tool = if is_looping { Some(last.0.clone()) } else { None };
    (is_looping, repeated_tool, consecutive)
}

/// Detects an error cascade: `threshold` or more of the last `window`
/// post-tool-use events whose output preview contains an error indicator.
///
/// Returns `(is_cascading, error_count)`.
pub fn detect_error_cascade(tool_calls: &[ToolEvent], threshold: usize, window: usize) -> (bool, usize) {
    let post_events: Vec<&str> = tool_calls
        .iter()
        .filter_map(|event| match event {
            ToolEvent::PostToolUse {
                tool_output_preview, ..
            } => Some(tool_output_preview.as_str()),
            ToolEvent::PreToolUse { .. } => None,
        })
        .collect();

    let start = post_events.len().saturating_sub(window);
    let recent = &post_events[start..];

    let error_count = recent
        .iter()
        .filter(|output| {
            let lower = output.to_lowercase();
            ERROR_INDICATORS.iter().any(|indicator| lower.contains(indicator))
        })
        .count();

    (error_count >= threshold, error_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre(tool_name: &str, input: serde_json::Value) -> ToolEvent {
        ToolEvent::PreToolUse {
            tool_name: tool_name.to_string(),
            start_time: 0.0,
            tool_input: input,
        }
    }

    fn post(preview: &str) -> ToolEvent {
        ToolEvent::PostToolUse {
            tool_name: "bash".to_string(),
            end_time: 0.0,
            tool_output_preview: preview.to_string(),
        }
    }

    #[test]
    fn repetition_requires_consecutive_identical_calls_at_the_end() {
        let calls = vec![
            pre("bash", serde_json::json!({"command": "ls"})),
            pre("bash", serde_json::json!({"command": "pwd"})),
            pre("bash", serde_json::json!({"command": "ls"})),
            pre("bash", serde_json::json!({"command": "ls"})),
            pre("bash", serde_json::json!({"command": "ls"})),
            pre("bash", serde_json::json!({"command": "ls"})),
        ];
        let (looping, tool, count) = detect_repetition(&calls, 4);
        assert!(looping);
        assert_eq!(tool.as_deref(), Some("bash"));
        assert_eq!(count, 4);
    }

    #[test]
    fn repetition_is_insensitive_to_key_order() {
        let calls = vec![
            pre("bash", serde_json::json!({"a": 1, "b": 2})),
            pre("bash", serde_json::json!({"b": 2, "a": 1})),
        ];
        let (looping, _, count) = detect_repetition(&calls, 2);
        assert!(looping);
        assert_eq!(count, 2);
    }

    #[test]
    fn below_threshold_is_not_looping() {
        let calls = vec![pre("bash", serde_json::json!({"command": "ls"}))];
        let (looping, _, _) = detect_repetition(&calls, 5);
        assert!(!looping);
    }

    #[test]
    fn error_cascade_counts_matching_indicators_in_window() {
        let calls = vec![
            post("ok"),
            post("Error: file not found"),
            post("Exception raised"),
            post("permission denied"),
            post("all good"),
        ];
        let (cascading, count) = detect_error_cascade(&calls, 3, 20);
        assert!(cascading);
        assert_eq!(count, 3);
    }

    #[test]
    fn error_cascade_only_considers_the_trailing_window() {
        let mut calls: Vec<ToolEvent> = (0..25).map(|_| post("error")).collect();
        calls.extend((0..5).map(|_| post("ok")));
        let (cascading, count) = detect_error_cascade(&calls, 5, 5);
        assert!(!cascading);
        assert_eq!(count, 0);
    }

    #[test]
    fn missing_log_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let calls = read_recent_tool_calls(dir.path(), "no-such-session", 50);
        assert!(calls.is_empty());
    }

    #[test]
    fn reads_trailing_lines_and_skips_corrupted_ones() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = crate::tool_use_log_path(dir.path(), "session-1");
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();

        let mut contents = String::new();
        for i in 0..10 {
            contents.push_str(&format!(
                "{{\"event\":\"pre_tool_use\",\"tool_name\":\"t{i}\",\"start_time\":0.0,\"tool_input\":{{}}}}\n"
            ));
        }
        contents.push_str("not json at all\n");
        std::fs::write(&log_path, contents).unwrap();

        // The trailing raw line is the corrupted one, so a 3-line window
        // yields 2 parsed calls (t8, t9) — corrupted lines are dropped, not
        // backfilled from further back.
        let calls = read_recent_tool_calls(dir.path(), "session-1", 3);
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            ToolEvent::PreToolUse { tool_name, .. } => assert_eq!(tool_name, "t9"),
            _ => panic!("expected a PreToolUse event"),
        }
    }
}
