use regex::Regex;
use std::sync::OnceLock;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)@\w+").unwrap())
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

/// Strips transport-level `@handle` mentions of the bot from `text` (spec
/// §4.3 step 2). Only the exact configured handle is stripped — other
/// mentions (of other users) are left intact.
pub fn strip_bot_mention(text: &str, bot_handle: &str) -> String {
    let needle = format!("@{}", bot_handle.trim_start_matches('@'));
    let stripped = text.replace(&needle, "");
    // Collapse the double space a removed mid-sentence mention leaves behind.
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips every `@mention`-shaped token, for transports with no single bot
/// handle to target (spec §4.3 step 2, generalized).
pub fn strip_all_mentions(text: &str) -> String {
    let stripped = mention_pattern().replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detects URLs in `text` and partitions them into `youtube` and `other`
/// (spec §4.3 step 3).
pub fn extract_urls(text: &str) -> (Vec<String>, Vec<String>) {
    let mut youtube = Vec::new();
    let mut other = Vec::new();

    for m in url_pattern().find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ')', ']']).to_string();
        if is_youtube_url(&url) {
            youtube.push(url);
        } else {
            other.push(url);
        }
    }

    (youtube, other)
}

fn is_youtube_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com/watch")
        || lower.contains("youtube.com/shorts")
        || lower.contains("youtu.be/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_configured_bot_handle_only() {
        let out = strip_bot_mention("@agentbot please look at @alice's PR", "agentbot");
        assert_eq!(out, "please look at @alice's PR");
    }

    #[test]
    fn partitions_youtube_and_other_urls() {
        let text = "check https://youtu.be/abc123 and https://example.com/page too";
        let (yt, other) = extract_urls(text);
        assert_eq!(yt, vec!["https://youtu.be/abc123"]);
        assert_eq!(other, vec!["https://example.com/page"]);
    }

    #[test]
    fn trims_trailing_punctuation_from_urls() {
        let (_, other) = extract_urls("see (https://example.com/page).");
        assert_eq!(other, vec!["https://example.com/page"]);
    }

    #[test]
    fn no_urls_returns_empty_vecs() {
        let (yt, other) = extract_urls("hello there, nothing to see");
        assert!(yt.is_empty());
        assert!(other.is_empty());
    }
}
