//! Regex heuristics over free-form agent text.
//!
//! These classifiers are advisory policy functions, not oracles: they match
//! the documented patterns below and nothing else, and callers must treat
//! a miss as "unknown", never as proof of the opposite.
//!
//! Completion detection:
//! - positive: "complete"/"completed", "done", "finished", "implemented"
//! - negative: the same words under negation ("not done", "isn't finished",
//!   "incomplete") — a negative match always wins over a positive one.

use regex::Regex;
use std::sync::LazyLock;

static POSITIVE_COMPLETION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(completed?|done|finished|implemented)\b").unwrap()
});

static NEGATIVE_COMPLETION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(not|isn't|aren't|never|no)\s+(yet\s+)?(completed?|done|finished|implemented)\b|\b(incomplete|unfinished)\b",
    )
    .unwrap()
});

static RATE_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate[ _-]?limit|too many requests|\b429\b|overloaded_error").unwrap()
});

static INTENT_CONTINUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(continue|keep going|resume|next step)\b").unwrap());

static INTENT_REVIEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(review|check|verify|validate)\b").unwrap());

/// What a piece of task text claims about completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    Complete,
    NotComplete,
    Unknown,
}

/// Classify task text for completion claims. Negations win.
pub fn detect_completion(text: &str) -> CompletionSignal {
    if NEGATIVE_COMPLETION.is_match(text) {
        return CompletionSignal::NotComplete;
    }
    if POSITIVE_COMPLETION.is_match(text) {
        return CompletionSignal::Complete;
    }
    CompletionSignal::Unknown
}

/// Whether transcript text looks like a provider rate-limit interruption.
/// Matches "rate limit"/"rate-limited", "too many requests", a bare 429
/// status, and the provider's overloaded error tag.
pub fn detect_rate_limit(text: &str) -> bool {
    RATE_LIMIT.is_match(text)
}

/// Coarse prompt-intent hint used to color the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptIntent {
    Continue,
    Review,
    Other,
}

pub fn detect_intent(prompt: &str) -> PromptIntent {
    if INTENT_CONTINUE.is_match(prompt) {
        PromptIntent::Continue
    } else if INTENT_REVIEW.is_match(prompt) {
        PromptIntent::Review
    } else {
        PromptIntent::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_forms_match() {
        assert_eq!(
            detect_completion("the repository layer is done"),
            CompletionSignal::Complete
        );
        assert_eq!(
            detect_completion("Task completed successfully."),
            CompletionSignal::Complete
        );
        assert_eq!(
            detect_completion("finished wiring the controller"),
            CompletionSignal::Complete
        );
    }

    #[test]
    fn negations_beat_positives() {
        assert_eq!(
            detect_completion("tests are not done yet"),
            CompletionSignal::NotComplete
        );
        assert_eq!(
            detect_completion("the migration is incomplete"),
            CompletionSignal::NotComplete
        );
        assert_eq!(
            detect_completion("done with setup but the feature isn't finished"),
            CompletionSignal::NotComplete
        );
    }

    #[test]
    fn unrelated_text_is_unknown() {
        assert_eq!(
            detect_completion("working on the schema"),
            CompletionSignal::Unknown
        );
        assert_eq!(detect_completion(""), CompletionSignal::Unknown);
    }

    #[test]
    fn rate_limit_patterns() {
        assert!(detect_rate_limit("API error 429: Too Many Requests"));
        assert!(detect_rate_limit("we were rate-limited, backing off"));
        assert!(detect_rate_limit("anthropic overloaded_error"));
        assert!(!detect_rate_limit("the build succeeded"));
    }

    #[test]
    fn intent_hints() {
        assert_eq!(detect_intent("continue where we left off"), PromptIntent::Continue);
        assert_eq!(detect_intent("please review the service layer"), PromptIntent::Review);
        assert_eq!(detect_intent("add a users table"), PromptIntent::Other);
    }
}
