//! Error types
//!
//! Component errors live next to their components (`StoreError`,
//! `AnalysisError`, `GraphError`); `MemoryError` wraps them at the facade.

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisError;
use crate::graph::GraphError;
use crate::memory::Tier;
use crate::store::StoreError;

/// Facade-level error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Vector backend failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Analyzer failure
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    /// Association graph load/flush failure
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Facade result type
pub type Result<T> = std::result::Result<T, MemoryError>;

/// A recoverable inconsistency between tiers
///
/// Never returned as an error. Logged at WARN and collected in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyWarning {
    /// The same id is stored in more than one tier
    DuplicateAcrossTiers {
        /// Trace id
        id: String,
        /// Tiers holding a copy
        tiers: Vec<Tier>,
    },
    /// A promotion wrote the copy but could not delete the original
    PartialMigration {
        /// Trace id
        id: String,
        /// Originating tier (still holds a copy)
        from: Tier,
        /// Destination tier
        to: Tier,
        /// Underlying failure
        reason: String,
    },
    /// A merged trace was written but some originals could not be deleted
    PartialMerge {
        /// Id of the merged trace
        merged_id: String,
        /// Originals that may still exist
        leftover: Vec<String>,
        /// Underlying failure
        reason: String,
    },
}

impl ConsistencyWarning {
    /// Emit the warning to the log
    pub fn log(&self) {
        tracing::warn!(warning = %self, "Consistency warning");
    }
}

impl std::fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyWarning::DuplicateAcrossTiers { id, tiers } => {
                let names: Vec<&str> = tiers.iter().map(Tier::as_str).collect();
                write!(f, "trace {} duplicated across tiers [{}]", id, names.join(", "))
            }
            ConsistencyWarning::PartialMigration { id, from, to, reason } => {
                write!(
                    f,
                    "trace {} copied {} -> {} but original not removed: {}",
                    id, from, to, reason
                )
            }
            ConsistencyWarning::PartialMerge {
                merged_id,
                leftover,
                reason,
            } => write!(
                f,
                "merged trace {} written but {} original(s) not removed: {}",
                merged_id,
                leftover.len(),
                reason
            ),
        }
    }
}
