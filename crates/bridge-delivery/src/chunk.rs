/// Splits `text` into chunks no longer than `limit` chars, preferring
/// paragraph boundaries (spec §4.7 supplement). Paragraphs (split on
/// `"\n\n"`) are packed greedily into a chunk until the next paragraph
/// would overflow it; a single paragraph that alone exceeds `limit` is
/// hard-wrapped at the nearest preceding whitespace.
///
/// Returns a single chunk (unsplit) when `text.chars().count() <= limit`.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if paragraph.chars().count() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(hard_wrap(paragraph, limit));
            continue;
        }

        let extra = if current.is_empty() { 0 } else { 2 };
        if current.chars().count() + extra + paragraph.chars().count() > limit {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Hard-wraps a single oversize paragraph at the nearest preceding
/// whitespace boundary at or before `limit` chars; falls back to a hard
/// character cut if no whitespace is found.
fn hard_wrap(paragraph: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= limit {
            out.push(chars[start..].iter().collect());
            break;
        }

        let window = &chars[start..start + limit];
        let split_at = window
            .iter()
            .rposition(|c| c.is_whitespace())
            .map(|i| i + 1)
            .unwrap_or(limit);

        out.push(chars[start..start + split_at].iter().collect::<String>());
        start += split_at;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello", 4_096);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn packs_paragraphs_greedily() {
        let text = format!("{}\n\n{}", "a".repeat(10), "b".repeat(10));
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn splits_when_combined_paragraphs_overflow() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(60));
        assert_eq!(chunks[1], "b".repeat(60));
    }

    #[test]
    fn oversize_paragraph_is_hard_wrapped() {
        let text = (0..20)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 30);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn oversize_9000_char_reply_stays_within_chunk_limit() {
        let text = (0..90)
            .map(|_| "x".repeat(95))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 4_096);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4_096));
    }
}
