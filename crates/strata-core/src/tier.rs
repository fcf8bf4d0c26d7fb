//! Tier Manager
//!
//! Owns the working, short-term and long-term collections and routes new
//! traces between them. Every trace handed out carries the tier it was read
//! from in [`MemoryTrace::tier`].

use std::sync::Arc;

use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::embeddings::Embedder;
use crate::memory::{MemoryTrace, Tier};
use crate::store::{
    ContainsFilter, InMemoryCollection, QueryHit, Result, SqliteStore, StoreError,
    VectorCollection,
};

/// Routes traces to the three tier collections
pub struct TierManager {
    collections: [Arc<dyn VectorCollection>; 3],
    importance_threshold: f64,
    emotion_threshold: f64,
}

impl TierManager {
    /// Build from explicit collections
    pub fn new(
        working: Arc<dyn VectorCollection>,
        short_term: Arc<dyn VectorCollection>,
        long_term: Arc<dyn VectorCollection>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            collections: [working, short_term, long_term],
            importance_threshold: config.importance_threshold,
            emotion_threshold: config.emotion_threshold,
        }
    }

    /// Three in-memory collections
    pub fn in_memory(embedder: Arc<dyn Embedder>, config: &MemoryConfig) -> Self {
        let make = |tier: Tier| -> Arc<dyn VectorCollection> {
            Arc::new(InMemoryCollection::new(
                config.collection_name(tier),
                Arc::clone(&embedder),
            ))
        };
        Self::new(
            make(Tier::Working),
            make(Tier::ShortTerm),
            make(Tier::LongTerm),
            config,
        )
    }

    /// Three collections over one SQLite store
    pub fn sqlite(store: &Arc<SqliteStore>, config: &MemoryConfig) -> Self {
        let make = |tier: Tier| -> Arc<dyn VectorCollection> {
            Arc::new(store.collection(config.collection_name(tier)))
        };
        Self::new(
            make(Tier::Working),
            make(Tier::ShortTerm),
            make(Tier::LongTerm),
            config,
        )
    }

    /// Collection backing `tier`
    pub fn collection(&self, tier: Tier) -> &dyn VectorCollection {
        self.collections[tier.index()].as_ref()
    }

    /// Placement rule for a new trace
    pub fn placement(&self, importance: f64, emotional_intensity: f64) -> Tier {
        if importance > self.importance_threshold || emotional_intensity > self.emotion_threshold {
            Tier::LongTerm
        } else {
            Tier::ShortTerm
        }
    }

    /// Store a new trace in the tier chosen by [`placement`](Self::placement)
    pub fn add(&self, trace: MemoryTrace) -> Result<MemoryTrace> {
        let tier = self.placement(trace.importance, trace.emotional_intensity);
        self.add_to(tier, trace)
    }

    /// Store a trace in an explicit tier; assigns an id when missing
    pub fn add_to(&self, tier: Tier, trace: MemoryTrace) -> Result<MemoryTrace> {
        let mut stored = self.add_batch_to(tier, vec![trace])?;
        stored
            .pop()
            .ok_or_else(|| StoreError::Rejected("empty batch result".to_string()))
    }

    /// Store several traces in one collection call
    pub fn add_batch_to(&self, tier: Tier, traces: Vec<MemoryTrace>) -> Result<Vec<MemoryTrace>> {
        let traces: Vec<MemoryTrace> = traces
            .into_iter()
            .map(|mut t| {
                if t.id.is_empty() {
                    t.id = Uuid::new_v4().to_string();
                }
                t.normalize_scores();
                t.tier = Some(tier);
                t
            })
            .collect();
        self.collection(tier).add(&traces)?;
        Ok(traces)
    }

    /// Fetch by id from one tier; missing ids are skipped
    pub fn get(&self, tier: Tier, ids: &[String]) -> Result<Vec<MemoryTrace>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(stamp(self.collection(tier).get(Some(ids), None, None)?, tier))
    }

    /// Fetch by id from whichever tier holds each trace, tiers searched in
    /// recall order. Tier failures are logged and skipped. Output follows
    /// the order of `ids`.
    pub fn get_any(&self, ids: &[String]) -> Vec<MemoryTrace> {
        let mut found: Vec<MemoryTrace> = Vec::with_capacity(ids.len());
        let mut remaining: Vec<String> = ids.to_vec();

        for tier in Tier::ALL {
            if remaining.is_empty() {
                break;
            }
            match self.get(tier, &remaining) {
                Ok(traces) => {
                    remaining.retain(|id| !traces.iter().any(|t| &t.id == id));
                    found.extend(traces);
                }
                Err(e) => tracing::warn!(tier = %tier, "Lookup failed: {}", e),
            }
        }

        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|t| &t.id == id) {
                ordered.push(found.swap_remove(pos));
            }
        }
        ordered
    }

    /// First tier holding `id`
    pub fn locate(&self, id: &str) -> Option<MemoryTrace> {
        self.get_any(&[id.to_string()]).pop()
    }

    /// Content-based fallback lookup: the first trace, in recall tier order,
    /// whose content equals `content` exactly
    pub fn find_by_content(&self, content: &str) -> Option<MemoryTrace> {
        let filter = ContainsFilter::Contains(content.to_string());
        for tier in Tier::ALL {
            match self.collection(tier).get(None, Some(&filter), None) {
                Ok(traces) => {
                    if let Some(t) = traces.into_iter().find(|t| t.content == content) {
                        return Some(t.in_tier(tier));
                    }
                }
                Err(e) => tracing::warn!(tier = %tier, "Content lookup failed: {}", e),
            }
        }
        None
    }

    /// Every trace in a tier
    pub fn all(&self, tier: Tier) -> Result<Vec<MemoryTrace>> {
        Ok(stamp(self.collection(tier).get(None, None, None)?, tier))
    }

    /// Containment-filtered fetch in insertion order
    pub fn filter(
        &self,
        tier: Tier,
        filter: &ContainsFilter,
        limit: usize,
    ) -> Result<Vec<MemoryTrace>> {
        Ok(stamp(self.collection(tier).get(None, Some(filter), Some(limit))?, tier))
    }

    /// Nearest-neighbour search within a tier
    pub fn query(
        &self,
        tier: Tier,
        text: &str,
        n_results: usize,
        filter: Option<&ContainsFilter>,
    ) -> Result<Vec<QueryHit>> {
        let hits = self.collection(tier).query(text, n_results, filter)?;
        Ok(hits
            .into_iter()
            .map(|mut h| {
                h.trace.tier = Some(tier);
                h
            })
            .collect())
    }

    /// Rewrite metadata of traces in a tier
    pub fn update(&self, tier: Tier, traces: &[MemoryTrace]) -> Result<()> {
        self.collection(tier).update(traces)
    }

    /// Delete from one tier (idempotent)
    pub fn delete(&self, tier: Tier, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.collection(tier).delete(ids)
    }

    /// Delete from every tier; all tiers are attempted, the first failure is returned
    pub fn delete_everywhere(&self, ids: &[String]) -> Result<()> {
        let mut first_error = None;
        for tier in Tier::ALL {
            if let Err(e) = self.delete(tier, ids) {
                tracing::warn!(tier = %tier, "Delete failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Trace count per tier, in [`Tier::ALL`] order
    pub fn counts(&self) -> Result<[usize; 3]> {
        Ok([
            self.collection(Tier::Working).count()?,
            self.collection(Tier::ShortTerm).count()?,
            self.collection(Tier::LongTerm).count()?,
        ])
    }

    /// Tiers currently holding `id`
    pub fn tiers_holding(&self, id: &str) -> Vec<Tier> {
        let ids = [id.to_string()];
        Tier::ALL
            .into_iter()
            .filter(|&tier| self.get(tier, &ids).is_ok_and(|t| !t.is_empty()))
            .collect()
    }
}

fn stamp(traces: Vec<MemoryTrace>, tier: Tier) -> Vec<MemoryTrace> {
    traces.into_iter().map(|t| t.in_tier(tier)).collect()
}
