//! k-nearest-neighbour lookup for a fixed set of embeddings

use crate::embeddings::{cosine_similarity, Embedding};

/// A neighbour of a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the slice the index was built from
    pub index: usize,
    /// Exact cosine similarity
    pub similarity: f32,
}

/// Cosine k-NN index over embeddings addressed by position
pub struct NeighborIndex {
    embeddings: Vec<Embedding>,
    #[cfg(feature = "vector-search")]
    hnsw: Option<super::VectorIndex>,
}

impl NeighborIndex {
    /// Build an index over `embeddings`
    pub fn build(embeddings: Vec<Embedding>) -> Self {
        #[cfg(feature = "vector-search")]
        {
            let hnsw = Self::build_hnsw(&embeddings);
            Self { embeddings, hnsw }
        }
        #[cfg(not(feature = "vector-search"))]
        {
            Self { embeddings }
        }
    }

    #[cfg(feature = "vector-search")]
    fn build_hnsw(embeddings: &[Embedding]) -> Option<super::VectorIndex> {
        let dimensions = embeddings.first()?.dimensions;
        if dimensions == 0 || embeddings.iter().any(|e| e.dimensions != dimensions) {
            return None;
        }
        let config = super::vector::VectorIndexConfig {
            dimensions,
            ..Default::default()
        };
        let mut index = match super::VectorIndex::with_config(config) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("HNSW index unavailable, using exact scan: {}", e);
                return None;
            }
        };
        if let Err(e) = index.reserve(embeddings.len()) {
            tracing::warn!("HNSW reserve failed, using exact scan: {}", e);
            return None;
        }
        for (i, e) in embeddings.iter().enumerate() {
            if let Err(err) = index.add(i as u64, &e.vector) {
                tracing::warn!("HNSW add failed, using exact scan: {}", err);
                return None;
            }
        }
        Some(index)
    }

    /// Number of indexed embeddings
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Embedding at `index`
    pub fn embedding(&self, index: usize) -> Option<&Embedding> {
        self.embeddings.get(index)
    }

    /// Exact similarity between two indexed points
    pub fn similarity(&self, a: usize, b: usize) -> f32 {
        match (self.embeddings.get(a), self.embeddings.get(b)) {
            (Some(x), Some(y)) => cosine_similarity(&x.vector, &y.vector),
            _ => 0.0,
        }
    }

    /// Up to `k` nearest neighbours of point `index` (itself excluded),
    /// most similar first; ties keep index order.
    pub fn neighbors(&self, index: usize, k: usize) -> Vec<Neighbor> {
        if index >= self.embeddings.len() || k == 0 {
            return vec![];
        }

        let candidates = self.candidates(index, k);
        let mut out: Vec<Neighbor> = candidates
            .into_iter()
            .filter(|&j| j != index)
            .map(|j| Neighbor {
                index: j,
                similarity: self.similarity(index, j),
            })
            .collect();

        out.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.index.cmp(&b.index))
        });
        out.truncate(k);
        out
    }

    #[cfg(feature = "vector-search")]
    fn candidates(&self, index: usize, k: usize) -> Vec<usize> {
        if let Some(hnsw) = &self.hnsw {
            // +1 because the point finds itself
            match hnsw.search(&self.embeddings[index].vector, k + 1) {
                Ok(keys) => return keys.into_iter().map(|(key, _)| key as usize).collect(),
                Err(e) => tracing::warn!("HNSW search failed, using exact scan: {}", e),
            }
        }
        (0..self.embeddings.len()).collect()
    }

    #[cfg(not(feature = "vector-search"))]
    fn candidates(&self, _index: usize, _k: usize) -> Vec<usize> {
        (0..self.embeddings.len()).collect()
    }
}
