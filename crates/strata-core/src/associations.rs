//! Association building
//!
//! Links a freshly stored trace to related traces already in the tiers.
//! Candidates come from keyword containment (all, then any) and then
//! semantic search, most durable tier first. Keyword matches carry no
//! distance and get a fixed similarity instead.

use std::collections::HashSet;
use std::sync::Arc;

use crate::analyzer::fallback_keywords;
use crate::config::MemoryConfig;
use crate::graph::{GraphError, GraphStore};
use crate::memory::{MemoryTrace, Tier};
use crate::store::ContainsFilter;
use crate::tier::TierManager;

/// Keywords used to search for candidates
pub const ASSOCIATION_KEYWORDS: usize = 3;

/// Similarity assigned to a trace containing every keyword
pub const ALL_KEYWORDS_SIMILARITY: f32 = 0.9;

/// Similarity assigned to a trace containing at least one keyword
pub const ANY_KEYWORD_SIMILARITY: f32 = 0.7;

/// A possible association
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub similarity: f32,
}

/// Finds and records associations for new traces
pub struct AssociationBuilder {
    tiers: Arc<TierManager>,
    graph: Arc<GraphStore>,
    threshold: f32,
    max_associations: usize,
    max_candidates: usize,
}

impl AssociationBuilder {
    pub fn new(tiers: Arc<TierManager>, graph: Arc<GraphStore>, config: &MemoryConfig) -> Self {
        Self {
            tiers,
            graph,
            threshold: config.association_threshold,
            max_associations: config.max_associations,
            max_candidates: config.association_candidates,
        }
    }

    /// Candidates for `trace` in discovery order, first occurrence of each id wins
    pub fn candidates(&self, trace: &MemoryTrace, keywords: &[String]) -> Vec<Candidate> {
        let keywords: Vec<String> = keywords.iter().take(ASSOCIATION_KEYWORDS).cloned().collect();
        let mut seen: HashSet<String> = HashSet::from([trace.id.clone()]);
        let mut out: Vec<Candidate> = Vec::new();

        let mut push = |out: &mut Vec<Candidate>, id: String, similarity: f32| {
            if out.len() < self.max_candidates && seen.insert(id.clone()) {
                out.push(Candidate { id, similarity });
            }
        };

        for tier in Tier::BY_DURABILITY {
            if out.len() >= self.max_candidates {
                break;
            }

            if !keywords.is_empty() {
                let mut steps = vec![(
                    ContainsFilter::all(keywords.iter().cloned()),
                    ALL_KEYWORDS_SIMILARITY,
                )];
                if keywords.len() > 1 {
                    steps.push((ContainsFilter::any(keywords.iter().cloned()), ANY_KEYWORD_SIMILARITY));
                }
                for (filter, similarity) in steps {
                    match self.tiers.filter(tier, &filter, self.max_candidates) {
                        Ok(found) => {
                            for t in found {
                                push(&mut out, t.id, similarity);
                            }
                        }
                        Err(e) => tracing::warn!(tier = %tier, "Keyword candidate search failed: {}", e),
                    }
                }
            }

            match self.tiers.query(tier, &trace.content, self.max_candidates, None) {
                Ok(hits) => {
                    for hit in hits {
                        let similarity = hit.similarity();
                        push(&mut out, hit.trace.id, similarity);
                    }
                }
                Err(e) => tracing::warn!(tier = %tier, "Semantic candidate search failed: {}", e),
            }
        }

        out
    }

    /// Strongest candidates above the threshold, at most `max_associations`
    pub fn select(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut chosen: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.similarity > self.threshold)
            .collect();
        chosen.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        chosen.truncate(self.max_associations);
        chosen
    }

    /// Link `trace` to its selected candidates in one graph mutation.
    /// Returns the number of new edges.
    pub fn link_new(&self, trace: &MemoryTrace, keywords: &[String]) -> Result<usize, GraphError> {
        let chosen = self.select(self.candidates(trace, keywords));
        if chosen.is_empty() {
            return Ok(0);
        }
        let added = self.graph.mutate(|g| {
            chosen.iter().filter(|c| g.link(&trace.id, &c.id)).count()
        })?;
        tracing::debug!(id = %trace.id, added, "Linked associations");
        Ok(added)
    }

    /// Rebuild associations for traces with no graph entry, using local
    /// keyword extraction. Returns the number of new edges.
    pub fn relink(&self, traces: &[MemoryTrace]) -> Result<usize, GraphError> {
        let orphans: Vec<&MemoryTrace> = traces
            .iter()
            .filter(|t| !self.graph.is_relinked(&t.id) && !self.graph.read(|g| g.contains(&t.id)))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        let plan: Vec<(String, Vec<Candidate>)> = orphans
            .iter()
            .map(|t| {
                let keywords = fallback_keywords(&t.content, ASSOCIATION_KEYWORDS);
                (t.id.clone(), self.select(self.candidates(t, &keywords)))
            })
            .collect();

        let added = self.graph.mutate(|g| {
            plan.iter()
                .map(|(id, chosen)| chosen.iter().filter(|c| g.link(id, &c.id)).count())
                .sum::<usize>()
        })?;
        tracing::info!(traces = orphans.len(), added, "Rebuilt associations");
        Ok(added)
    }
}
