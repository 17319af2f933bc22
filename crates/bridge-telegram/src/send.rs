//! Single-message send helpers for the Telegram `Transport` implementation.
//!
//! Chunking to the transport's size limit is `bridge-delivery`'s job (spec
//! §4.7); this module only sends one already-sized chunk and copes
//! defensively if it still doesn't fit Telegram's hard 4096-char wire limit.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

/// Telegram's hard single-message limit.
const TELEGRAM_HARD_LIMIT: usize = 4096;

/// Escapes MarkdownV2 special characters: `` _ * [ ] ( ) ~ ` # + - = | { } . ! ``
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|'
            | '{' | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Defensive truncation for a chunk that exceeds Telegram's hard wire limit
/// despite already having been chunked upstream (e.g. `max_chunk_chars`
/// misconfigured above 4096, or a dead-letter replay that skipped
/// re-chunking).
fn hard_truncate(text: &str) -> &str {
    if text.chars().count() <= TELEGRAM_HARD_LIMIT {
        return text;
    }
    match text.char_indices().nth(TELEGRAM_HARD_LIMIT) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Sends `text` as a single message to `chat_id`, threaded as a reply to
/// `reply_to` if given. Tries MarkdownV2 first; if Telegram rejects the
/// parse mode (e.g. an escaping edge case), falls back to plain text.
/// Returns the platform message id of the sent message.
pub async fn send_single(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: Option<i64>,
) -> Result<i64, teloxide::RequestError> {
    let text = hard_truncate(text);
    let escaped = escape_markdown_v2(text);

    let mut request = bot.send_message(chat_id, &escaped).parse_mode(ParseMode::MarkdownV2);
    if let Some(reply_to_id) = reply_to {
        request = request.reply_to_message_id(teloxide::types::MessageId(reply_to_id as i32));
    }

    match request.await {
        Ok(msg) => Ok(msg.id.0 as i64),
        Err(_) => {
            warn!("Telegram: MarkdownV2 rejected, falling back to plain text");
            let mut fallback = bot.send_message(chat_id, text);
            if let Some(reply_to_id) = reply_to {
                fallback =
                    fallback.reply_to_message_id(teloxide::types::MessageId(reply_to_id as i32));
            }
            fallback.await.map(|msg| msg.id.0 as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_markdown_v2_escapes_specials() {
        let input = "Hello. World! (test) [link] ~strike~";
        let escaped = escape_markdown_v2(input);
        assert!(escaped.contains("\\."));
        assert!(escaped.contains("\\!"));
        assert!(escaped.contains("\\("));
        assert!(escaped.contains("\\)"));
        assert!(escaped.contains("\\["));
        assert!(escaped.contains("\\]"));
        assert!(escaped.contains("\\~"));
    }

    #[test]
    fn escape_markdown_v2_leaves_normal_chars() {
        let input = "Hello world 123 abc";
        assert_eq!(escape_markdown_v2(input), input);
    }

    #[test]
    fn hard_truncate_leaves_short_text_unchanged() {
        assert_eq!(hard_truncate("hello"), "hello");
    }

    #[test]
    fn hard_truncate_caps_at_hard_limit() {
        let text = "a".repeat(5000);
        let truncated = hard_truncate(&text);
        assert_eq!(truncated.chars().count(), TELEGRAM_HARD_LIMIT);
    }
}
