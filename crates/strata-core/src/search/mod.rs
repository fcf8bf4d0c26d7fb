//! Nearest-neighbour search over embedding sets
//!
//! The merge engine needs, for every trace in a tier, its most similar peers.
//! [`NeighborIndex`] answers that with an exact cosine scan; with the
//! `vector-search` feature the candidate set comes from a USearch HNSW index
//! and similarities are then re-checked exactly.

mod neighbors;
#[cfg(feature = "vector-search")]
mod vector;

pub use neighbors::{Neighbor, NeighborIndex};
#[cfg(feature = "vector-search")]
pub use vector::{VectorIndex, VectorSearchError};
