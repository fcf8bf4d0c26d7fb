//! Feature-hashing embedder
//!
//! Maps word unigrams and character trigrams into a fixed number of signed
//! buckets and L2-normalizes the result. Deterministic across runs and
//! platforms, so stored vectors stay comparable without a model download.

use super::{Embedder, Embedding, EmbeddingError};

/// Default bucket count
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic bag-of-features embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_name: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashingEmbedder {
    /// Create an embedder with [`DEFAULT_HASH_DIMENSIONS`] buckets
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_HASH_DIMENSIONS)
    }

    /// Create an embedder with a custom bucket count (minimum 8)
    pub fn with_dimensions(dimensions: usize) -> Self {
        let dimensions = dimensions.max(8);
        Self {
            dimensions,
            model_name: format!("strata-hashing-{}", dimensions),
        }
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dimensions];

        for word in tokenize(text) {
            self.accumulate(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                self.accumulate(&mut vector, gram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        let mut embedding = Embedding::new(vector);
        embedding.normalize();
        embedding
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        // High bit picks the sign so collisions partially cancel
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
