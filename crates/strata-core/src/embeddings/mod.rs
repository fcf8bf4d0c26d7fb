//! Semantic Embeddings Module
//!
//! The engine never computes embeddings itself; it consumes an [`Embedder`].
//!
//! Provided embedders:
//! - [`HashingEmbedder`]: deterministic feature hashing, no model download
//! - `FastEmbedder` (feature `embeddings`): local ONNX inference with
//!   nomic-embed-text-v1.5, Matryoshka-truncated to 256 dimensions

mod hashing;
#[cfg(feature = "embeddings")]
mod local;

pub use hashing::{HashingEmbedder, DEFAULT_HASH_DIMENSIONS};
#[cfg(feature = "embeddings")]
pub use local::{matryoshka_truncate, FastEmbedder, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};

use std::sync::Arc;

/// Batch size used when embedding many texts at once
pub const BATCH_SIZE: usize = 32;

/// The best embedder compiled into this build
///
/// With the `embeddings` feature the local model is loaded (downloading it
/// on first use); otherwise the hashing embedder is used.
pub fn default_embedder() -> Result<Arc<dyn Embedder>, EmbeddingError> {
    #[cfg(feature = "embeddings")]
    {
        let embedder = FastEmbedder::new();
        embedder.init()?;
        Ok(Arc::new(embedder))
    }
    #[cfg(not(feature = "embeddings"))]
    {
        Ok(Arc::new(HashingEmbedder::new()))
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    ModelInit(String),
    /// Failed to generate embedding
    EmbeddingFailed(String),
    /// Invalid input (empty, too long, etc.)
    InvalidInput(String),
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::ModelInit(e) => write!(f, "Model initialization failed: {}", e),
            EmbeddingError::EmbeddingFailed(e) => write!(f, "Embedding generation failed: {}", e),
            EmbeddingError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
        }
    }
}

impl std::error::Error for EmbeddingError {}

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// Text-to-vector capability used by collections and the merge engine
pub trait Embedder: Send + Sync {
    /// Model identifier, stored next to persisted vectors
    fn model_name(&self) -> &str;

    /// Output dimensionality
    fn dimensions(&self) -> usize;

    /// Embed several texts; output order matches input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
    }
}

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A semantic embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Dimensions of the vector
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Compute cosine similarity with another embedding
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Normalize the embedding vector to unit length
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
    }

    /// Check if the embedding is normalized (unit length)
    pub fn is_normalized(&self) -> bool {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < 0.001
    }

    /// Convert to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

// ============================================================================
// SIMILARITY FUNCTIONS
// ============================================================================

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// Cosine distance (`1 - similarity`), the value collections report on query hits
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

// ============================================================================
// TESTS
// ============================================================================
