//! In-process collection with brute-force ranking

use std::sync::{Arc, RwLock};

use super::{rank_by_distance, ContainsFilter, QueryHit, Result, StoreError, VectorCollection};
use crate::embeddings::{Embedder, Embedding};
use crate::memory::MemoryTrace;

struct Entry {
    trace: MemoryTrace,
    embedding: Embedding,
}

/// Insertion-ordered collection held in memory
///
/// Nothing is persisted. Used for tests and ephemeral sessions.
pub struct InMemoryCollection {
    name: String,
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryCollection {
    /// Create an empty collection
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.into(),
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn poisoned(&self) -> StoreError {
        StoreError::LockPoisoned(format!("collection {}", self.name))
    }
}

impl VectorCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, traces: &[MemoryTrace]) -> Result<()> {
        if traces.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = traces.iter().map(|t| t.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        for (trace, embedding) in traces.iter().zip(embeddings) {
            let mut trace = trace.clone();
            trace.tier = None;
            match entries.iter_mut().find(|e| e.trace.id == trace.id) {
                Some(existing) => {
                    existing.trace = trace;
                    existing.embedding = embedding;
                }
                None => entries.push(Entry { trace, embedding }),
            }
        }
        Ok(())
    }

    fn get(
        &self,
        ids: Option<&[String]>,
        filter: Option<&ContainsFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryTrace>> {
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        let matched = entries
            .iter()
            .filter(|e| ids.is_none_or(|ids| ids.contains(&e.trace.id)))
            .filter(|e| filter.is_none_or(|f| f.matches(&e.trace.content)))
            .map(|e| e.trace.clone());

        Ok(match limit {
            Some(n) => matched.take(n).collect(),
            None => matched.collect(),
        })
    }

    fn query(
        &self,
        text: &str,
        n_results: usize,
        filter: Option<&ContainsFilter>,
    ) -> Result<Vec<QueryHit>> {
        if n_results == 0 {
            return Ok(vec![]);
        }
        let query = if text.trim().is_empty() {
            None
        } else {
            Some(self.embedder.embed(text)?)
        };

        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        let candidates = entries
            .iter()
            .filter(|e| filter.is_none_or(|f| f.matches(&e.trace.content)))
            .map(|e| (e.trace.clone(), e.embedding.clone()))
            .collect();

        Ok(rank_by_distance(query.as_ref(), candidates, n_results))
    }

    fn update(&self, traces: &[MemoryTrace]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        for trace in traces {
            if let Some(existing) = entries.iter_mut().find(|e| e.trace.id == trace.id) {
                let content = std::mem::take(&mut existing.trace.content);
                existing.trace = trace.clone();
                existing.trace.content = content;
                existing.trace.tier = None;
            }
        }
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        entries.retain(|e| !ids.contains(&e.trace.id));
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| self.poisoned())?.len())
    }
}
