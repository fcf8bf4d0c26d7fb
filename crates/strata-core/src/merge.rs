//! Merge Engine
//!
//! Collapses near-duplicate traces into one synthesized trace.
//!
//! A pass first reconciles ids stored in more than one tier, then handles
//! each selected tier in turn:
//! 1. embed every trace once, in batches
//! 2. visit traces by descending importance; each unvisited trace seeds a
//!    group and pulls in its graph neighbours, then its nearest neighbours,
//!    whose cosine similarity to the seed exceeds the merge threshold
//! 3. summarize every group of two or more into a trace with a fresh id,
//!    write it, delete the originals from every tier, then rewire and flush
//!    the graph for that group
//!
//! Callers must hold the engine's write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::analyzer::TextAnalyzer;
use crate::config::MemoryConfig;
use crate::embeddings::{Embedder, Embedding};
use crate::error::{ConsistencyWarning, MemoryError, Result};
use crate::graph::GraphStore;
use crate::memory::{MergeReport, MemoryTrace, Tier, MERGED_FROM_KEY};
use crate::search::NeighborIndex;
use crate::tier::TierManager;

/// Tiers scanned by a short-only pass
pub const SHORT_TIERS: [Tier; 2] = [Tier::Working, Tier::ShortTerm];

struct GroupMerge {
    merged: MemoryTrace,
    absorbed: Vec<String>,
    warning: Option<ConsistencyWarning>,
}

/// Near-duplicate clustering and merging
pub struct MergeEngine {
    tiers: Arc<TierManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<dyn TextAnalyzer>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    neighbors: usize,
    batch_size: usize,
}

impl MergeEngine {
    pub fn new(
        tiers: Arc<TierManager>,
        graph: Arc<GraphStore>,
        analyzer: Arc<dyn TextAnalyzer>,
        embedder: Arc<dyn Embedder>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            tiers,
            graph,
            analyzer,
            embedder,
            threshold: config.merge_threshold,
            neighbors: config.merge_neighbors.max(1),
            batch_size: config.embed_batch_size.max(1),
        }
    }

    /// Run a merge pass over every tier, or only working and short-term
    ///
    /// Per-group failures are counted and leave the group untouched. Only a
    /// failure to persist a group's rewired graph fails the call; groups
    /// merged before it stay merged and persisted.
    pub fn merge_similar(&self, short_only: bool) -> Result<MergeReport> {
        let start = Utc::now();
        let mut report = MergeReport::default();

        let duplicates = self.reconcile_duplicates();
        report.duplicates_resolved = duplicates.len();
        report.warnings.extend(duplicates);

        let selected: &[Tier] = if short_only { &SHORT_TIERS } else { &Tier::ALL };

        for &tier in selected {
            let traces = match self.tiers.all(tier) {
                Ok(traces) => traces,
                Err(e) => {
                    tracing::warn!(tier = %tier, "Merge pass skipped tier: {}", e);
                    continue;
                }
            };
            report.traces_scanned += traces.len();
            if traces.len() < 2 {
                continue;
            }

            let groups = self.find_groups(traces);
            report.groups_found += groups.len();

            for group in groups {
                match self.merge_group(&group) {
                    Ok(done) => {
                        report.groups_merged += 1;
                        report.traces_absorbed += done.absorbed.len();
                        report.merged_ids.push(done.merged.id.clone());
                        if let Some(warning) = done.warning {
                            warning.log();
                            report.warnings.push(warning);
                        }
                    }
                    Err(MemoryError::Graph(e)) => {
                        tracing::error!(tier = %tier, "Could not persist merged graph: {}", e);
                        return Err(e.into());
                    }
                    Err(e) => {
                        report.failed_groups += 1;
                        tracing::warn!(tier = %tier, size = group.len(), "Merge group failed: {}", e);
                    }
                }
            }
        }

        report.duration_ms = (Utc::now() - start).num_milliseconds();
        tracing::info!(
            scanned = report.traces_scanned,
            merged = report.groups_merged,
            absorbed = report.traces_absorbed,
            failed = report.failed_groups,
            duplicates = report.duplicates_resolved,
            "Merge pass complete"
        );
        Ok(report)
    }

    /// Resolve ids present in more than one tier
    ///
    /// The copy in the most durable tier is kept and raised to the highest
    /// recall statistics of any copy; the others are deleted.
    pub fn reconcile_duplicates(&self) -> Vec<ConsistencyWarning> {
        let mut copies: BTreeMap<String, Vec<MemoryTrace>> = BTreeMap::new();
        for tier in Tier::ALL {
            match self.tiers.all(tier) {
                Ok(traces) => {
                    for t in traces {
                        copies.entry(t.id.clone()).or_default().push(t);
                    }
                }
                Err(e) => tracing::warn!(tier = %tier, "Duplicate scan skipped tier: {}", e),
            }
        }

        let mut warnings = Vec::new();
        for (id, mut found) in copies {
            if found.len() < 2 {
                continue;
            }
            found.sort_by_key(|t| std::cmp::Reverse(t.tier));
            let held: Vec<Tier> = found.iter().filter_map(|t| t.tier).collect();

            let mut keeper = found.remove(0);
            let keeper_tier = keeper.tier.unwrap_or(Tier::LongTerm);
            let best_count = found.iter().map(|t| t.recall_count).max().unwrap_or(0);
            let latest = found.iter().map(|t| t.last_recall).max();

            let mut raised = false;
            if best_count > keeper.recall_count {
                keeper.recall_count = best_count;
                raised = true;
            }
            if let Some(latest) = latest.filter(|l| *l > keeper.last_recall) {
                keeper.last_recall = latest;
                raised = true;
            }
            if raised {
                if let Err(e) = self.tiers.update(keeper_tier, std::slice::from_ref(&keeper)) {
                    tracing::warn!(id = %id, "Could not raise duplicate statistics: {}", e);
                }
            }

            for stale in &found {
                if let Some(tier) = stale.tier {
                    if let Err(e) = self.tiers.delete(tier, std::slice::from_ref(&id)) {
                        tracing::warn!(id = %id, tier = %tier, "Could not delete duplicate: {}", e);
                    }
                }
            }

            let warning = ConsistencyWarning::DuplicateAcrossTiers { id, tiers: held };
            warning.log();
            warnings.push(warning);
        }
        warnings
    }

    /// Group a tier's traces into merge candidates (size > 1 only)
    fn find_groups(&self, traces: Vec<MemoryTrace>) -> Vec<Vec<MemoryTrace>> {
        let (traces, embeddings) = self.embed_all(traces);
        let n = traces.len();
        if n < 2 {
            return Vec::new();
        }

        let index = NeighborIndex::build(embeddings);
        let k = self.neighbors.min(n);
        let positions: HashMap<&str, usize> = traces
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| traces[b].importance.total_cmp(&traces[a].importance));

        let mut processed = vec![false; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for seed in order {
            if processed[seed] {
                continue;
            }
            processed[seed] = true;
            let mut group = vec![seed];

            let linked = self.graph.read(|g| g.neighbors(&traces[seed].id));
            for id in &linked {
                if let Some(&j) = positions.get(id.as_str()) {
                    if !processed[j] && index.similarity(seed, j) > self.threshold {
                        processed[j] = true;
                        group.push(j);
                    }
                }
            }

            for neighbor in index.neighbors(seed, k) {
                if neighbor.similarity <= self.threshold {
                    break;
                }
                if !processed[neighbor.index] {
                    processed[neighbor.index] = true;
                    group.push(neighbor.index);
                }
            }

            if group.len() > 1 {
                groups.push(group);
            }
        }

        groups
            .into_iter()
            .map(|g| g.into_iter().map(|i| traces[i].clone()).collect())
            .collect()
    }

    /// Embed traces in batches; traces whose batch fails are left out
    fn embed_all(&self, traces: Vec<MemoryTrace>) -> (Vec<MemoryTrace>, Vec<Embedding>) {
        let mut kept = Vec::with_capacity(traces.len());
        let mut embeddings = Vec::with_capacity(traces.len());

        for chunk in traces.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|t| t.content.as_str()).collect();
            match self.embedder.embed_batch(&texts) {
                Ok(batch) if batch.len() == chunk.len() => {
                    kept.extend(chunk.iter().cloned());
                    embeddings.extend(batch);
                }
                Ok(batch) => tracing::warn!(
                    expected = chunk.len(),
                    got = batch.len(),
                    "Embedding batch size mismatch, skipping batch"
                ),
                Err(e) => tracing::warn!(size = chunk.len(), "Embedding batch failed: {}", e),
            }
        }

        (kept, embeddings)
    }

    fn merge_group(&self, members: &[MemoryTrace]) -> Result<GroupMerge> {
        let mut ordered = members.to_vec();
        ordered.sort_by(|a, b| b.merge_weight().total_cmp(&a.merge_weight()));

        let contents: Vec<String> = ordered.iter().map(|t| t.content.clone()).collect();
        let summary = self.analyzer.summarize(&contents)?;

        let target = target_tier(&ordered);
        let merged = self.tiers.add_to(target, combine(&ordered, summary))?;

        let absorbed: Vec<String> = ordered.iter().map(|t| t.id.clone()).collect();
        let warning = self
            .tiers
            .delete_everywhere(&absorbed)
            .err()
            .map(|e| ConsistencyWarning::PartialMerge {
                merged_id: merged.id.clone(),
                leftover: absorbed.clone(),
                reason: e.to_string(),
            });
        self.graph.mutate(|g| g.rewire_merged(&absorbed, &merged.id))?;

        tracing::debug!(id = %merged.id, tier = %target, members = absorbed.len(), "Merged group");
        Ok(GroupMerge {
            merged,
            absorbed,
            warning,
        })
    }
}

/// Combine `ordered` (highest merge weight first) into one trace with a
/// fresh id and `content`
///
/// Importance and emotional intensity are averages weighted by each
/// member's normalised merge weight; all-zero weights count equally.
pub fn combine(ordered: &[MemoryTrace], content: String) -> MemoryTrace {
    let weights: Vec<f64> = ordered.iter().map(MemoryTrace::merge_weight).collect();
    let total: f64 = weights.iter().sum();
    let weights: Vec<f64> = if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / ordered.len().max(1) as f64; ordered.len()]
    };

    let weighted = |f: fn(&MemoryTrace) -> f64| -> f64 {
        ordered.iter().zip(&weights).map(|(t, w)| f(t) * w).sum()
    };

    let now = Utc::now();
    let top = ordered.first();
    let mut metadata = top.map(|t| t.metadata.clone()).unwrap_or_default();
    metadata.insert(
        MERGED_FROM_KEY.to_string(),
        serde_json::Value::from(ordered.iter().map(|t| t.id.clone()).collect::<Vec<_>>()),
    );

    let mut merged = MemoryTrace::new(content, top.map(|t| t.memory_type).unwrap_or_default());
    merged.id = Uuid::new_v4().to_string();
    merged.importance = weighted(|t| t.importance);
    merged.emotional_intensity = weighted(|t| t.emotional_intensity);
    merged.timestamp = ordered.iter().map(|t| t.timestamp).max().unwrap_or(now);
    merged.last_recall = ordered.iter().map(|t| t.last_recall).max().unwrap_or(now);
    merged.recall_count = ordered
        .iter()
        .fold(0u32, |acc, t| acc.saturating_add(t.recall_count));
    merged.context_tags = ordered
        .iter()
        .flat_map(|t| t.context_tags.iter().cloned())
        .collect();
    merged.metadata = metadata;
    merged.normalize_scores();
    merged
}

/// Tier of the top-weighted member, else the most common tier, else long-term
pub fn target_tier(ordered: &[MemoryTrace]) -> Tier {
    if let Some(tier) = ordered.first().and_then(|t| t.tier) {
        return tier;
    }
    let mut counts: BTreeMap<Tier, usize> = BTreeMap::new();
    for tier in ordered.iter().filter_map(|t| t.tier) {
        *counts.entry(tier).or_default() += 1;
    }
    // ties go to the more durable tier
    counts
        .into_iter()
        .max_by_key(|(tier, count)| (*count, *tier))
        .map(|(tier, _)| tier)
        .unwrap_or(Tier::LongTerm)
}
