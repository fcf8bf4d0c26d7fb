//! Text analysis capability
//!
//! The engine asks a [`TextAnalyzer`] to score new text, pull keywords out of
//! queries and fold near-duplicates into one summary. Any implementation may
//! be slow or fail; callers substitute neutral defaults (see [`Scores`]).

mod heuristic;

pub use heuristic::HeuristicAnalyzer;

use std::collections::HashSet;
use std::sync::LazyLock;

/// Analyzer error
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// The backing model or service could not be reached
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),
    /// The analyzer answered with something unusable
    #[error("Invalid analyzer response: {0}")]
    InvalidResponse(String),
    /// Nothing to analyze
    #[error("Empty input")]
    Empty,
}

/// Importance and emotional intensity of a text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    /// Importance in `[0, 1]`
    pub importance: f64,
    /// Emotional intensity in `[0, 1]`
    pub emotional_intensity: f64,
}

impl Default for Scores {
    /// Neutral fallback used whenever scoring fails
    fn default() -> Self {
        Self {
            importance: 0.5,
            emotional_intensity: 0.5,
        }
    }
}

/// Scoring, keyword extraction and summarization
pub trait TextAnalyzer: Send + Sync {
    /// Score importance and emotional intensity
    fn score(&self, text: &str) -> Result<Scores, AnalysisError>;

    /// Up to `k` keywords, most salient first
    fn keywords(&self, text: &str, k: usize) -> Result<Vec<String>, AnalysisError>;

    /// Fold `ordered_texts` (most important first) into one text
    fn summarize(&self, ordered_texts: &[String]) -> Result<String, AnalysisError>;
}

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "if", "then", "so", "of", "to", "in", "on", "at",
        "by", "for", "with", "from", "as", "is", "are", "was", "were", "be", "been", "being",
        "am", "do", "does", "did", "have", "has", "had", "i", "me", "my", "you", "your", "he",
        "she", "it", "its", "we", "our", "they", "them", "their", "this", "that", "these",
        "those", "what", "which", "who", "whom", "when", "where", "why", "how", "not", "no",
        "can", "could", "will", "would", "should", "shall", "may", "might", "must", "about",
        "into", "over", "just", "very", "really", "also", "some", "any", "all", "there", "here",
        "than", "too", "up", "out", "yes", "ok",
    ]
    .into_iter()
    .collect()
});

/// Whether `word` (lowercased) is a stop word
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Stop-word filtered keyword extraction
///
/// Tokens keep their original casing so they can be used directly as
/// containment filters against stored documents. Ranked by frequency, then
/// by first position; duplicates are folded case-insensitively.
pub fn fallback_keywords(text: &str, k: usize) -> Vec<String> {
    let mut ranked: Vec<(String, usize, usize)> = Vec::new();

    let tokens = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .map(|t| t.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|t| t.chars().count() > 1);

    for (position, token) in tokens.enumerate() {
        let lower = token.to_lowercase();
        if is_stop_word(&lower) {
            continue;
        }
        match ranked.iter_mut().find(|(w, _, _)| w.to_lowercase() == lower) {
            Some(entry) => entry.1 += 1,
            None => ranked.push((token.to_string(), 1, position)),
        }
    }

    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(k).map(|(w, _, _)| w).collect()
}
