//! Local rule-based analyzer
//!
//! Emotional intensity comes from an arousal lexicon plus urgency markers.
//! Importance combines explicit "remember this" cues, personal facts, arousal
//! and length. Summaries keep the first text whole and append only sentences
//! from later texts that add new words.

use std::collections::{BTreeSet, HashMap};

use super::{fallback_keywords, AnalysisError, Scores, TextAnalyzer};

const URGENCY_BOOST: f64 = 0.3;
const EXCLAMATION_BOOST: f64 = 0.1;
const BASE_AROUSAL: f64 = 0.2;
const BASE_IMPORTANCE: f64 = 0.3;

/// Lexicon-driven [`TextAnalyzer`] that needs no model
pub struct HeuristicAnalyzer {
    /// word -> arousal
    lexicon: HashMap<&'static str, f64>,
    urgency_markers: Vec<&'static str>,
    importance_markers: Vec<&'static str>,
    personal_markers: Vec<&'static str>,
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicAnalyzer {
    /// Create an analyzer with the built-in lexicon
    pub fn new() -> Self {
        Self {
            lexicon: Self::build_lexicon(),
            urgency_markers: vec![
                "asap", "urgent", "emergency", "right now", "immediately", "data loss",
                "production down", "server down", "hotfix", "rollback",
            ],
            importance_markers: vec![
                "remember", "important", "never forget", "always", "never", "must",
                "don't forget", "make sure", "deadline", "allergic", "birthday", "anniversary",
            ],
            personal_markers: vec![
                "my name", "i am", "i'm", "my wife", "my husband", "my partner", "my son",
                "my daughter", "my mother", "my father", "my friend", "i live", "i work",
            ],
        }
    }

    fn build_lexicon() -> HashMap<&'static str, f64> {
        let mut lex = HashMap::new();

        // Low arousal
        for (word, a) in [
            ("good", 0.3), ("nice", 0.2), ("calm", 0.1), ("fine", 0.1), ("okay", 0.1),
            ("bad", 0.3), ("sad", 0.4), ("tired", 0.3), ("bored", 0.1), ("boring", 0.1),
            ("like", 0.3), ("enjoy", 0.4), ("miss", 0.4), ("lonely", 0.5), ("slow", 0.2),
        ] {
            lex.insert(word, a);
        }

        // High arousal, positive
        for (word, a) in [
            ("love", 0.8), ("amazing", 0.8), ("fantastic", 0.8), ("incredible", 0.8),
            ("excited", 0.8), ("thrilled", 0.9), ("awesome", 0.7), ("wonderful", 0.7),
            ("happy", 0.6), ("proud", 0.6), ("perfect", 0.7), ("breakthrough", 0.9),
            ("success", 0.6), ("won", 0.7), ("promoted", 0.7), ("married", 0.8),
        ] {
            lex.insert(word, a);
        }

        // High arousal, negative
        for (word, a) in [
            ("hate", 0.8), ("angry", 0.8), ("furious", 0.9), ("terrible", 0.8),
            ("awful", 0.7), ("afraid", 0.8), ("scared", 0.8), ("terrified", 0.9),
            ("panic", 0.9), ("crash", 0.9), ("broken", 0.7), ("failed", 0.7), ("fail", 0.7),
            ("error", 0.6), ("lost", 0.6), ("died", 0.9), ("hurt", 0.7), ("sick", 0.6),
            ("worried", 0.6), ("anxious", 0.7), ("stressed", 0.7), ("fired", 0.8),
        ] {
            lex.insert(word, a);
        }

        // Surprise
        for (word, a) in [
            ("unexpected", 0.7), ("surprising", 0.7), ("shocked", 0.9), ("wow", 0.7),
            ("strange", 0.6), ("weird", 0.5),
        ] {
            lex.insert(word, a);
        }

        lex
    }

    fn words(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }

    fn arousal(&self, text: &str, lower: &str, words: &[String]) -> f64 {
        let hits: Vec<f64> = words
            .iter()
            .filter_map(|w| self.lexicon.get(w.as_str()).copied())
            .collect();

        let base = if hits.is_empty() {
            BASE_AROUSAL
        } else {
            hits.iter().sum::<f64>() / hits.len() as f64
        };

        let urgency = self
            .urgency_markers
            .iter()
            .filter(|m| lower.contains(*m))
            .count() as f64
            * URGENCY_BOOST;
        let exclamations = (text.matches('!').count() as f64 * EXCLAMATION_BOOST).min(0.3);

        (base + urgency + exclamations).clamp(0.0, 1.0)
    }
}

impl TextAnalyzer for HeuristicAnalyzer {
    fn score(&self, text: &str) -> Result<Scores, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::Empty);
        }

        let lower = text.to_lowercase();
        let words = Self::words(text);
        let arousal = self.arousal(text, &lower, &words);

        let mut importance = BASE_IMPORTANCE;
        let explicit = self
            .importance_markers
            .iter()
            .filter(|m| lower.contains(*m))
            .count();
        importance += (explicit as f64 * 0.25).min(0.5);
        if self.personal_markers.iter().any(|m| lower.contains(m)) {
            importance += 0.15;
        }
        importance += (words.len() as f64 / 100.0).min(0.1);
        importance += arousal * 0.2;

        Ok(Scores {
            importance: importance.clamp(0.0, 1.0),
            emotional_intensity: arousal,
        })
    }

    fn keywords(&self, text: &str, k: usize) -> Result<Vec<String>, AnalysisError> {
        Ok(fallback_keywords(text, k))
    }

    fn summarize(&self, ordered_texts: &[String]) -> Result<String, AnalysisError> {
        let mut texts = ordered_texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty());
        let first = texts.next().ok_or(AnalysisError::Empty)?;

        let mut seen: BTreeSet<String> = Self::words(first).into_iter().collect();
        let mut parts = vec![first.to_string()];

        for text in texts {
            for sentence in split_sentences(text) {
                let words = Self::words(sentence);
                if words.iter().all(|w| seen.contains(w)) {
                    continue;
                }
                seen.extend(words);
                parts.push(sentence.to_string());
            }
        }

        Ok(parts.join(" "))
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}
