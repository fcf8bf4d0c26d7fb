//! Test Data Factory
//!
//! Builds traces with controlled scores, ages and recall history, plus a
//! few canned content sets.

use chrono::{Duration, Utc};
use strata_core::{MemoryTrace, MemoryType};

/// Factory for test traces
pub struct TraceFactory;

impl TraceFactory {
    /// Episodic trace with the given scores, created now
    pub fn trace(content: &str, importance: f64, emotional_intensity: f64) -> MemoryTrace {
        MemoryTrace::new(content, MemoryType::Episodic).with_scores(importance, emotional_intensity)
    }

    /// Trace last touched `age_days` ago
    pub fn aged(content: &str, importance: f64, age_days: i64) -> MemoryTrace {
        let mut trace = Self::trace(content, importance, 0.3);
        let when = Utc::now() - Duration::days(age_days);
        trace.timestamp = when;
        trace.last_recall = when;
        trace
    }

    /// Trace with an existing recall history
    pub fn recalled(content: &str, importance: f64, age_days: i64, recall_count: u32) -> MemoryTrace {
        let mut trace = Self::aged(content, importance, age_days);
        trace.recall_count = recall_count;
        trace
    }

    /// `n` distinct one-line contents
    pub fn contents(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("imported note {} about topic {}", i, TOPICS[i % TOPICS.len()]))
            .collect()
    }

    /// A spread of traces for forgetting: (content, importance, age_days, recalls)
    pub fn forgetting_mix() -> Vec<MemoryTrace> {
        vec![
            Self::recalled("stale trivia about a parking spot", 0.1, 120, 0),
            Self::recalled("stale but vital allergy note", 0.95, 120, 5),
            Self::recalled("last week's lunch order", 0.2, 7, 0),
            Self::recalled("a fresh idea about the garden", 0.3, 0, 0),
            Self::recalled("an old, often recalled phone number", 0.4, 90, 6),
            Self::recalled("an old, middling reminder", 0.5, 60, 1),
            Self::recalled("half-forgotten podcast name", 0.05, 45, 0),
            Self::recalled("moderately old meeting notes", 0.3, 25, 2),
        ]
    }
}

const TOPICS: [&str; 6] = ["coffee", "garden", "violin", "passport", "kitchen", "deadline"];
