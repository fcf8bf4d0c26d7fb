//! Tier collections
//!
//! A [`VectorCollection`] is the per-tier store the engine writes traces to.
//! It supports id lookups, substring containment filters and nearest-neighbour
//! queries. Each call is atomic on its own; the engine never relies on
//! transactions spanning calls.

mod memory;
mod migrations;
mod sqlite;

pub use memory::InMemoryCollection;
pub use migrations::{apply_migrations, get_current_version, Migration, MIGRATIONS};
pub use sqlite::{SqliteCollection, SqliteStore};

use crate::embeddings::{cosine_distance, Embedding, EmbeddingError};
use crate::memory::MemoryTrace;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector backend error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Embedding the documents failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Metadata could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A lock guarding the collection was poisoned
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    /// The backend refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// FILTERS
// ============================================================================

/// Substring containment predicate over a document
///
/// Matching is case-sensitive, like a document `$contains` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainsFilter {
    /// Document contains the text
    Contains(String),
    /// Document contains every keyword; an empty list matches everything
    All(Vec<String>),
    /// Document contains at least one keyword; an empty list matches nothing
    Any(Vec<String>),
}

impl ContainsFilter {
    /// AND of keywords
    pub fn all<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContainsFilter::All(keywords.into_iter().map(Into::into).collect())
    }

    /// OR of keywords
    pub fn any<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContainsFilter::Any(keywords.into_iter().map(Into::into).collect())
    }

    /// Evaluate against a document
    pub fn matches(&self, document: &str) -> bool {
        match self {
            ContainsFilter::Contains(text) => document.contains(text.as_str()),
            ContainsFilter::All(keywords) => keywords.iter().all(|k| document.contains(k.as_str())),
            ContainsFilter::Any(keywords) => keywords.iter().any(|k| document.contains(k.as_str())),
        }
    }
}

// ============================================================================
// COLLECTION TRAIT
// ============================================================================

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// The matching trace
    pub trace: MemoryTrace,
    /// Cosine distance from the query (`0` = identical direction)
    pub distance: f32,
}

impl QueryHit {
    /// `1 - distance`
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Per-tier trace store
///
/// Traces returned by a collection have `tier == None`; the tier manager
/// fills it in.
pub trait VectorCollection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert traces, replacing any existing trace with the same id
    fn add(&self, traces: &[MemoryTrace]) -> Result<()>;

    /// Fetch traces by id and/or containment filter, in insertion order.
    /// Unknown ids are silently omitted.
    fn get(
        &self,
        ids: Option<&[String]>,
        filter: Option<&ContainsFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryTrace>>;

    /// Up to `n_results` traces matching `filter`, nearest to `text` first
    fn query(&self, text: &str, n_results: usize, filter: Option<&ContainsFilter>)
        -> Result<Vec<QueryHit>>;

    /// Rewrite the metadata (everything except content) of existing traces.
    /// Ids not present are skipped.
    fn update(&self, traces: &[MemoryTrace]) -> Result<()>;

    /// Delete traces by id. Idempotent.
    fn delete(&self, ids: &[String]) -> Result<()>;

    /// Number of stored traces
    fn count(&self) -> Result<usize>;
}

/// Rank candidates by cosine distance to `query`, ties kept in candidate order
pub(crate) fn rank_by_distance(
    query: Option<&Embedding>,
    candidates: Vec<(MemoryTrace, Embedding)>,
    n_results: usize,
) -> Vec<QueryHit> {
    let mut hits: Vec<QueryHit> = candidates
        .into_iter()
        .map(|(trace, embedding)| {
            let distance = match query {
                Some(q) => cosine_distance(&q.vector, &embedding.vector),
                None => 1.0,
            };
            QueryHit { trace, distance }
        })
        .collect();

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(n_results);
    hits
}
