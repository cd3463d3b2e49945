//! Candidate phrase extraction from model replies.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Single words and two-word / hyphenated pairs, matched left to right.
static PHRASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\w+[\s-]+\w+|\w+)\b").expect("phrase pattern is valid")
});

/// Splits a reply into phrases that might name a species or form.
pub trait MentionMatcher: Send + Sync {
    /// Unique candidate phrases, in the order they first appear.
    fn candidates(&self, reply: &str) -> Vec<String>;
}

/// Default matcher: lowercases the reply and takes non-overlapping runs of
/// one word or two words joined by whitespace or hyphens.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhraseMatcher;

impl MentionMatcher for PhraseMatcher {
    fn candidates(&self, reply: &str) -> Vec<String> {
        let lowered = reply.to_lowercase();
        let mut seen = HashSet::new();
        PHRASE_PATTERN
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .filter(|phrase| seen.insert(phrase.clone()))
            .collect()
    }
}
