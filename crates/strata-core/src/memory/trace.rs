//! Memory trace - the unit record stored in every tier

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MemoryType, Tier};

/// Metadata key listing the ids a merged trace was built from
pub const MERGED_FROM_KEY: &str = "merged_from";

/// Default importance and emotional intensity when nothing better is known
const NEUTRAL_SCORE: f64 = 0.5;

/// Clamp a score into `[0, 1]`; NaN becomes the neutral score.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_SCORE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A single stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrace {
    /// Unique identifier, assigned at creation
    pub id: String,
    /// Text content
    pub content: String,
    /// Creation time, refreshed whenever the trace is strengthened
    pub timestamp: DateTime<Utc>,
    /// Importance in `[0, 1]`
    pub importance: f64,
    /// Emotional intensity in `[0, 1]`
    pub emotional_intensity: f64,
    /// Topic tags
    #[serde(default)]
    pub context_tags: BTreeSet<String>,
    /// Times this trace was returned by recall
    #[serde(default)]
    pub recall_count: u32,
    /// Last time this trace was returned by recall
    pub last_recall: DateTime<Utc>,
    /// Episodic, semantic or procedural
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Opaque caller-supplied attributes
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Tier the trace was read from, when known
    #[serde(skip)]
    pub tier: Option<Tier>,
}

impl MemoryTrace {
    /// Create a trace with a fresh id and neutral scores
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: now,
            importance: NEUTRAL_SCORE,
            emotional_intensity: NEUTRAL_SCORE,
            context_tags: BTreeSet::new(),
            recall_count: 0,
            last_recall: now,
            memory_type,
            metadata: BTreeMap::new(),
            tier: None,
        }
    }

    /// Set importance and emotional intensity, clamped to `[0, 1]`
    pub fn with_scores(mut self, importance: f64, emotional_intensity: f64) -> Self {
        self.importance = clamp_unit(importance);
        self.emotional_intensity = clamp_unit(emotional_intensity);
        self
    }

    /// Add context tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Replace the caller-supplied metadata
    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Record the tier this trace lives in
    pub fn in_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// importance × recall_count
    pub fn consolidation_score(&self) -> f64 {
        self.importance * f64::from(self.recall_count)
    }

    /// Merge ordering weight: importance×0.7 + emotional_intensity×0.3
    pub fn merge_weight(&self) -> f64 {
        self.importance * 0.7 + self.emotional_intensity * 0.3
    }

    /// Ids this trace was merged from, if it is a merge product
    pub fn merged_from(&self) -> Vec<String> {
        self.metadata
            .get(MERGED_FROM_KEY)
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clamp scores back into range after a deserialization or manual edit
    pub(crate) fn normalize_scores(&mut self) {
        self.importance = clamp_unit(self.importance);
        self.emotional_intensity = clamp_unit(self.emotional_intensity);
    }
}
