//! # Strata Core
//!
//! Tiered associative memory engine for conversational agents.
//!
//! - **Three tiers**: working, short-term and long-term collections with a
//!   placement rule driven by importance and emotional intensity
//! - **Hybrid recall**: keyword containment (all, then any) and semantic
//!   search per tier, topped up through an association graph
//! - **Consolidation**: recalled traces are strengthened in the background and
//!   promoted to long-term once `importance × recall_count` passes a threshold
//! - **Merging**: near-duplicates (cosine > 0.95) are summarized into one trace
//! - **Forgetting**: weighted eviction by recency, importance, recall and
//!   association
//!
//! Storage and text analysis are pluggable through [`VectorCollection`],
//! [`Embedder`] and [`TextAnalyzer`]. SQLite-backed collections, a hashing
//! embedder and a heuristic analyzer ship with the crate.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_core::{HashingEmbedder, HeuristicAnalyzer, MemoryConfig, MemorySystem, MemoryType};
//!
//! let memory = MemorySystem::open(
//!     MemoryConfig::default(),
//!     Arc::new(HeuristicAnalyzer::new()),
//!     Arc::new(HashingEmbedder::new()),
//! )?;
//!
//! memory.add_memory("My sister's birthday is on March 3rd", MemoryType::Episodic)?;
//! for trace in memory.recall_memory("when is my sister's birthday", 5) {
//!     println!("{}", trace.content);
//! }
//!
//! // Periodic maintenance
//! memory.manual_maintenance()?;
//! memory.forget_old(30)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Compile SQLite into the binary
//! - `embeddings`: Local embedding generation with fastembed
//! - `vector-search`: HNSW neighbour search with USearch during merge passes
//! - `full`: All of the above

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod analyzer;
pub mod associations;
pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod forgetting;
pub mod graph;
pub mod memory;
pub mod merge;
pub mod recall;
pub mod search;
pub mod store;
pub mod system;
pub mod tier;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    clamp_unit, ForgetReport, MemorySnapshot, MemoryStats, MemoryTrace, MemoryType, MergeReport,
    StrengthenOutcome, Tier, MERGED_FROM_KEY,
};

// Errors
pub use error::{ConsistencyWarning, MemoryError, Result};

// Configuration
pub use config::MemoryConfig;

// Collaborators
pub use analyzer::{AnalysisError, HeuristicAnalyzer, Scores, TextAnalyzer};
pub use embeddings::{default_embedder, Embedder, Embedding, EmbeddingError, HashingEmbedder};
pub use store::{
    ContainsFilter, InMemoryCollection, QueryHit, SqliteCollection, SqliteStore, StoreError,
    VectorCollection,
};

#[cfg(feature = "embeddings")]
pub use embeddings::FastEmbedder;

// Components
pub use associations::AssociationBuilder;
pub use consolidation::ConsolidationEngine;
pub use forgetting::{forget_score, ForgettingEngine};
pub use graph::{AssociationGraph, GraphError, GraphStore};
pub use merge::MergeEngine;
pub use recall::RecallEngine;
pub use search::NeighborIndex;
pub use tier::TierManager;

// Facade
pub use system::{BatchItem, MemorySystem};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BatchItem, ConsistencyWarning, Embedder, HashingEmbedder, HeuristicAnalyzer, MemoryConfig,
        MemoryError, MemorySystem, MemoryTrace, MemoryType, Result, TextAnalyzer, Tier,
    };
}
