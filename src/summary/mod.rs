//! Sentence-aligned summaries.
//!
//! Summaries are extractive: whole sentences from the start of a section, in
//! order, until enough text has been collected. A sentence is never cut, so a
//! single long sentence may exceed `max_chars`.

use std::sync::LazyLock;

use regex::Regex;

/// Terminal punctuation followed by whitespace.
static SENTENCE_BOUNDARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").ok());

/// Default lower bound on summary length, in characters.
pub const DEFAULT_MIN_CHARS: usize = 800;

/// Default upper bound on summary length, in characters.
pub const DEFAULT_MAX_CHARS: usize = 1500;

/// Split text into trimmed sentences at `.`, `!` or `?` followed by whitespace.
///
/// The punctuation stays with its sentence. Whitespace-only pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;

    let Some(boundary_re) = SENTENCE_BOUNDARY.as_ref() else {
        return if text.is_empty() { Vec::new() } else { vec![text] };
    };

    for boundary in boundary_re.find_iter(text) {
        // Punctuation is ASCII, so `start() + 1` is a char boundary.
        sentences.push(&text[start..boundary.start() + 1]);
        start = boundary.end();
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Builds extractive summaries bounded by character counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryBuilder {
    min_chars: usize,
    max_chars: usize,
}

impl Default for SummaryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS, DEFAULT_MAX_CHARS)
    }
}

impl SummaryBuilder {
    /// Create a builder with the given length thresholds.
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
        }
    }

    /// Summarize `text` with this builder's thresholds.
    pub fn summarize(&self, text: &str) -> String {
        build(text, self.min_chars, self.max_chars)
    }
}

/// Accumulate whole sentences of `text` until at least `min_chars` or
/// `max_chars` characters have been collected.
///
/// Sentence lengths are counted without the joining spaces. Empty input
/// yields an empty string.
pub fn build(text: &str, min_chars: usize, max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0usize;

    for sentence in split_sentences(text) {
        parts.push(sentence);
        total += sentence.chars().count();
        if total >= min_chars || total >= max_chars {
            break;
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(n: usize, len: usize) -> String {
        let body = "x".repeat(len.saturating_sub(2));
        format!("{}{}.", n % 10, body)
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(build("", 800, 1500), "");
        assert_eq!(build("   \n\t ", 800, 1500), "");
    }

    #[test]
    fn test_split_keeps_punctuation() {
        let sentences = split_sentences("First one. Second one!  Third one?\nFourth");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third one?", "Fourth"]
        );
    }

    #[test]
    fn test_split_ignores_punctuation_without_whitespace() {
        let sentences = split_sentences("Values were 3.5 mg. The p-value was 0.01.");
        assert_eq!(sentences, vec!["Values were 3.5 mg.", "The p-value was 0.01."]);
    }

    #[test]
    fn test_short_text_is_returned_whole() {
        let text = "Tumors consume glucose. They secrete lactate.";
        assert_eq!(build(text, 800, 1500), text);
    }

    #[test]
    fn test_stops_after_reaching_min_chars() {
        let sentences: Vec<String> = (0..10).map(|i| sentence(i, 300)).collect();
        let text = sentences.join(" ");

        let summary = build(&text, 800, 1500);
        // 300 + 300 + 300 crosses 800 on the third sentence.
        assert_eq!(summary, sentences[..3].join(" "));
        assert!(summary.ends_with('.'));
    }

    #[test]
    fn test_max_chars_stops_when_min_is_unreachable() {
        let sentences: Vec<String> = (0..10).map(|i| sentence(i, 100)).collect();
        let text = sentences.join(" ");

        let summary = build(&text, 5000, 250);
        assert_eq!(summary, sentences[..3].join(" "));
    }

    #[test]
    fn test_long_sentence_is_never_truncated() {
        let long = format!("{}.", "a".repeat(3000));
        let text = format!("{} Next sentence.", long);
        assert_eq!(build(&text, 800, 1500), long);
    }

    #[test]
    fn test_whitespace_pieces_do_not_count() {
        let text = "One.   \n\n  Two. \t Three.";
        assert_eq!(build(text, 9, 100), "One. Two. Three.");
        assert_eq!(build(text, 8, 100), "One. Two.");
    }

    #[test]
    fn test_summary_never_ends_mid_sentence() {
        let text = "Aerobic glycolysis is a hallmark of cancer. \
                    Lactate accumulates in the microenvironment! \
                    Does hypoxia drive this switch? \
                    Several studies suggest so. "
            .repeat(20);
        let summary = build(&text, 800, 1500);
        let last = summary.chars().last().unwrap();
        assert!(matches!(last, '.' | '!' | '?'));
        assert!(summary.chars().count() >= 800);
    }

    #[test]
    fn test_default_builder_uses_default_thresholds() {
        let builder = SummaryBuilder::default();
        assert_eq!(builder, SummaryBuilder::new(800, 1500));
        assert_eq!(builder.summarize("Short."), "Short.");
    }
}
