const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "to", "of", "and", "or", "in", "on", "at",
    "for", "with", "it", "this", "that", "i", "you", "we", "please", "can", "could", "would",
];

const MAX_SLUG_WORDS: usize = 6;
const MAX_SLUG_CHARS: usize = 48;

/// Derives a work-item slug from the first salient words of a message
/// (spec §4.5 supplement): stopwords stripped, lowercased, hyphen-joined,
/// truncated to 48 chars.
pub fn slugify(message_text: &str) -> String {
    let words: Vec<String> = message_text
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .take(MAX_SLUG_WORDS)
        .collect();

    let mut slug = words.join("-");
    if slug.is_empty() {
        slug = "session".to_string();
    }
    if slug.len() > MAX_SLUG_CHARS {
        slug.truncate(MAX_SLUG_CHARS);
        // Avoid leaving a dangling hyphen after truncation.
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Derives a branch name of the form `session/<slug>-<short-id>` (spec
/// §4.5), where `short_id` is the first 8 characters of the session id.
pub fn branch_name(slug: &str, session_id: &str) -> String {
    let short_id = &session_id[..8.min(session_id.len())];
    format!("session/{slug}-{short_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stopwords_and_hyphenates() {
        let slug = slugify("please add support for dark mode toggle");
        assert_eq!(slug, "add-support-dark-mode-toggle");
    }

    #[test]
    fn truncates_to_max_chars_without_dangling_hyphen() {
        let long = "alpha ".repeat(20);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn falls_back_when_message_is_all_stopwords() {
        let slug = slugify("the a an");
        assert_eq!(slug, "session");
    }

    #[test]
    fn branch_name_uses_first_eight_chars_of_session_id() {
        let name = branch_name("add-dark-mode", "0199abc12345-long-suffix");
        assert_eq!(name, "session/add-dark-mode-0199abc1");
    }
}
