use async_trait::async_trait;

use bridge_kv::ClassificationType;

/// Result of classifying a spawning message (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub classification_type: ClassificationType,
    pub classification_confidence: f64,
}

/// Classifies an inbound message into bug/feature/chore plus a confidence.
///
/// Delegated to an external collaborator per spec §4.5 — the registry only
/// stores the returned tuple and tolerates classification failure by
/// persisting the session with `classification_type = None`. The real
/// implementation (an LLM call) is out of scope (spec §1); the default here
/// is a cheap keyword heuristic, grounded in the kind of fallback
/// classifiers the teacher's provider router falls back to when no model
/// call is configured.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, message_text: &str) -> Option<Classification>;
}

/// Keyword-based default classifier. Never fails — returns a low-confidence
/// `Chore` guess when nothing matches, so callers needing a hard failure
/// path should wrap this in their own collaborator instead.
pub struct KeywordClassifier;

const BUG_WORDS: &[&str] = &[
    "bug", "crash", "broken", "error", "fails", "failing", "regression", "exception", "traceback",
];
const FEATURE_WORDS: &[&str] = &[
    "add", "feature", "implement", "support", "new", "build", "create",
];

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, message_text: &str) -> Option<Classification> {
        let lower = message_text.to_lowercase();
        let bug_hits = BUG_WORDS.iter().filter(|w| lower.contains(*w)).count();
        let feature_hits = FEATURE_WORDS.iter().filter(|w| lower.contains(*w)).count();

        let (classification_type, hits) = if bug_hits >= feature_hits && bug_hits > 0 {
            (ClassificationType::Bug, bug_hits)
        } else if feature_hits > 0 {
            (ClassificationType::Feature, feature_hits)
        } else {
            (ClassificationType::Chore, 0)
        };

        // Confidence rises with keyword density but never claims certainty.
        let confidence = (0.4 + 0.15 * hits as f64).min(0.9);

        Some(Classification {
            classification_type,
            classification_confidence: confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn classifies_bug_reports() {
        let c = KeywordClassifier.classify("the login page crashes with an exception").await.unwrap();
        assert_eq!(c.classification_type, ClassificationType::Bug);
    }

    #[tokio::test]
    async fn classifies_feature_requests() {
        let c = KeywordClassifier.classify("please add support for dark mode").await.unwrap();
        assert_eq!(c.classification_type, ClassificationType::Feature);
    }

    #[tokio::test]
    async fn falls_back_to_chore_with_low_confidence() {
        let c = KeywordClassifier.classify("what time is it").await.unwrap();
        assert_eq!(c.classification_type, ClassificationType::Chore);
        assert!(c.classification_confidence < 0.5);
    }
}
