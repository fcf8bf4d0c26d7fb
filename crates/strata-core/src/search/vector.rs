//! HNSW Vector Index
//!
//! Thin wrapper around USearch used to narrow neighbour candidates when a
//! tier holds many traces. Keys are positions in the caller's embedding set.

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    /// Failed to create the index
    IndexCreation(String),
    /// Failed to add a vector
    IndexAdd(String),
    /// Failed to search
    IndexSearch(String),
    /// Dimension mismatch
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::IndexCreation(e) => write!(f, "Index creation failed: {}", e),
            VectorSearchError::IndexAdd(e) => write!(f, "Failed to add vector: {}", e),
            VectorSearchError::IndexSearch(e) => write!(f, "Search failed: {}", e),
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "Invalid dimensions: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

/// Configuration for vector index
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Number of dimensions
    pub dimensions: usize,
    /// HNSW connectivity parameter
    pub connectivity: usize,
    /// Expansion factor for adding vectors
    pub expansion_add: usize,
    /// Expansion factor for searching
    pub expansion_search: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: crate::embeddings::DEFAULT_HASH_DIMENSIONS,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }
    }
}

/// Cosine HNSW index keyed by `u64`
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
}

impl VectorIndex {
    /// Create an index with the given configuration
    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            // Full precision: merge thresholds sit close to 1.0
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };

        let index =
            Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        Ok(Self {
            index,
            dimensions: config.dimensions,
        })
    }

    /// Reserve capacity; must be called before adding vectors
    pub fn reserve(&self, capacity: usize) -> Result<(), VectorSearchError> {
        self.index.reserve(capacity).map_err(|e| {
            VectorSearchError::IndexCreation(format!("Failed to reserve capacity: {}", e))
        })
    }

    /// Number of vectors
    pub fn len(&self) -> usize {
        self.index.size()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a vector under `key`
    pub fn add(&mut self, key: u64, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(self.dimensions, vector.len()));
        }
        if self.index.size() >= self.index.capacity() {
            self.reserve(std::cmp::max(self.index.capacity() * 2, 16))?;
        }
        self.index
            .add(key, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))
    }

    /// Approximate nearest keys with similarity (`1 - distance`)
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(u64, f32)>, VectorSearchError> {
        if query.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(self.dimensions, query.len()));
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        let results = self
            .index
            .search(query, limit)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        Ok(results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(key, distance)| (*key, 1.0 - distance))
            .collect())
    }
}
