//! Counting analyzer
//!
//! Wraps [`HeuristicAnalyzer`] and records every call so tests can assert
//! how often (or whether) the engine consulted the analyzer. Individual
//! capabilities can be switched to fail or to return fixed scores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use strata_core::{AnalysisError, HeuristicAnalyzer, Scores, TextAnalyzer};

/// Analyzer that counts calls and can be told to fail
#[derive(Default)]
pub struct CountingAnalyzer {
    inner: HeuristicAnalyzer,
    score_calls: AtomicUsize,
    keyword_calls: AtomicUsize,
    summarize_calls: AtomicUsize,
    fail_score: AtomicBool,
    fail_keywords: AtomicBool,
    fail_summarize: AtomicBool,
    fixed_scores: Mutex<Option<Scores>>,
}

impl CountingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `score` with the given raw values (not clamped)
    pub fn with_fixed_scores(self, importance: f64, emotional_intensity: f64) -> Self {
        self.set_fixed_scores(Some(Scores {
            importance,
            emotional_intensity,
        }));
        self
    }

    pub fn set_fixed_scores(&self, scores: Option<Scores>) {
        if let Ok(mut fixed) = self.fixed_scores.lock() {
            *fixed = scores;
        }
    }

    pub fn fail_score(&self, fail: bool) {
        self.fail_score.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keywords(&self, fail: bool) {
        self.fail_keywords.store(fail, Ordering::SeqCst);
    }

    pub fn fail_summarize(&self, fail: bool) {
        self.fail_summarize.store(fail, Ordering::SeqCst);
    }

    /// Fail every capability
    pub fn fail_all(&self, fail: bool) {
        self.fail_score(fail);
        self.fail_keywords(fail);
        self.fail_summarize(fail);
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn keyword_calls(&self) -> usize {
        self.keyword_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.score_calls() + self.keyword_calls() + self.summarize_calls()
    }

    pub fn reset_counts(&self) {
        self.score_calls.store(0, Ordering::SeqCst);
        self.keyword_calls.store(0, Ordering::SeqCst);
        self.summarize_calls.store(0, Ordering::SeqCst);
    }
}

impl TextAnalyzer for CountingAnalyzer {
    fn score(&self, text: &str) -> Result<Scores, AnalysisError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_score.load(Ordering::SeqCst) {
            return Err(AnalysisError::Unavailable("scoring disabled".to_string()));
        }
        let fixed = self.fixed_scores.lock().ok().and_then(|f| *f);
        match fixed {
            Some(scores) => Ok(scores),
            None => self.inner.score(text),
        }
    }

    fn keywords(&self, text: &str, k: usize) -> Result<Vec<String>, AnalysisError> {
        self.keyword_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_keywords.load(Ordering::SeqCst) {
            return Err(AnalysisError::Unavailable("keywords disabled".to_string()));
        }
        self.inner.keywords(text, k)
    }

    fn summarize(&self, ordered_texts: &[String]) -> Result<String, AnalysisError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_summarize.load(Ordering::SeqCst) {
            return Err(AnalysisError::InvalidResponse("summaries disabled".to_string()));
        }
        self.inner.summarize(ordered_texts)
    }
}
