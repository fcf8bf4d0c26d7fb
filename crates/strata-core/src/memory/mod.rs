//! Memory module - Core types and data structures
//!
//! Implements the tiered memory model with:
//! - Memory traces carrying importance, emotional intensity and recall statistics
//! - Three ordered storage tiers (working, short-term, long-term)
//! - Result/report types returned by maintenance passes

mod trace;

pub use trace::{clamp_unit, MemoryTrace, MERGED_FROM_KEY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConsistencyWarning;

// ============================================================================
// TIERS
// ============================================================================

/// Storage tier of a trace
///
/// Tiers are ordered by durability: `Working < ShortTerm < LongTerm`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Session scratch space
    Working,
    /// Default landing tier for ordinary traces
    ShortTerm,
    /// Durable tier for important, emotional or frequently recalled traces
    LongTerm,
}

impl Tier {
    /// Recall priority order
    pub const ALL: [Tier; 3] = [Tier::Working, Tier::ShortTerm, Tier::LongTerm];

    /// Order used when looking for association candidates (most durable first)
    pub const BY_DURABILITY: [Tier; 3] = [Tier::LongTerm, Tier::ShortTerm, Tier::Working];

    /// Stable string form, also used as the collection name suffix
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Working => "working",
            Tier::ShortTerm => "short_term",
            Tier::LongTerm => "long_term",
        }
    }

    /// Index into tier-ordered arrays
    pub(crate) fn index(&self) -> usize {
        match self {
            Tier::Working => 0,
            Tier::ShortTerm => 1,
            Tier::LongTerm => 2,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "working" => Ok(Tier::Working),
            "short_term" | "shortterm" | "short" => Ok(Tier::ShortTerm),
            "long_term" | "longterm" | "long" => Ok(Tier::LongTerm),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

// ============================================================================
// MEMORY TYPES (Tulving 1972)
// ============================================================================

/// Memory classification
/// - Episodic: events, conversation moments
/// - Semantic: facts and generalizations
/// - Procedural: how-to knowledge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// What happened - events, conversations, specific moments
    #[default]
    Episodic,
    /// What I know - facts, concepts, generalizations
    Semantic,
    /// How-to knowledge - skills, procedures
    Procedural,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryType::Episodic => write!(f, "episodic"),
            MemoryType::Semantic => write!(f, "semantic"),
            MemoryType::Procedural => write!(f, "procedural"),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// Outcome of strengthening a single trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthenOutcome {
    /// Trace id
    pub id: String,
    /// Recall count after the increment
    pub recall_count: u32,
    /// importance × recall_count after the increment
    pub consolidation_score: f64,
    /// Tier holding the trace after the call
    pub tier: Tier,
    /// Whether the trace was promoted into long-term by this call
    pub promoted: bool,
}

/// Result of one merge pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Traces scanned across the selected tiers
    pub traces_scanned: usize,
    /// Groups of size > 1 that were found
    pub groups_found: usize,
    /// Groups successfully replaced by a merged trace
    pub groups_merged: usize,
    /// Original traces absorbed into merged traces
    pub traces_absorbed: usize,
    /// Ids of the merged traces created by this pass
    pub merged_ids: Vec<String>,
    /// Cross-tier duplicates removed before merging
    pub duplicates_resolved: usize,
    /// Groups left unmerged because of a failure
    pub failed_groups: usize,
    /// Consistency problems observed during the pass
    pub warnings: Vec<ConsistencyWarning>,
    /// Duration in milliseconds
    pub duration_ms: i64,
}

/// Result of one forgetting pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetReport {
    /// Traces scored
    pub traces_scanned: usize,
    /// Ids deleted by this pass
    pub forgotten_ids: Vec<String>,
    /// Tiers whose deletion failed (left untouched)
    pub failed_tiers: Vec<Tier>,
    /// Duration in milliseconds
    pub duration_ms: i64,
}

impl ForgetReport {
    /// Number of traces deleted
    pub fn forgotten(&self) -> usize {
        self.forgotten_ids.len()
    }
}

/// Per-tier and graph counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Traces in the working tier
    pub working: usize,
    /// Traces in the short-term tier
    pub short_term: usize,
    /// Traces in the long-term tier
    pub long_term: usize,
    /// Graph nodes with at least one neighbour
    pub graph_nodes: usize,
    /// Undirected edge count
    pub graph_edges: usize,
    /// Graph was reset after a corrupt load and is being rebuilt
    pub graph_degraded: bool,
    /// Keyword cache entries
    pub cached_queries: usize,
}

impl MemoryStats {
    /// Total traces across all tiers
    pub fn total(&self) -> usize {
        self.working + self.short_term + self.long_term
    }
}

/// Serializable dump of every tier plus the association graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// When the snapshot was taken
    pub exported_at: DateTime<Utc>,
    /// Working tier contents
    pub working: Vec<MemoryTrace>,
    /// Short-term tier contents
    pub short_term: Vec<MemoryTrace>,
    /// Long-term tier contents
    pub long_term: Vec<MemoryTrace>,
    /// Adjacency lists keyed by trace id
    pub graph: std::collections::BTreeMap<String, Vec<String>>,
}
