//! Consolidation Engine
//!
//! Strengthening bumps a trace's recall statistics and promotes it to
//! long-term once `importance × recall_count` passes the consolidation
//! threshold. Promotion writes the long-term copy first and deletes the
//! original second; a failed delete leaves a duplicate that the next merge
//! pass reconciles.
//!
//! Callers must hold the engine's write lock: the stored record is re-read
//! here so concurrent strengthening of the same trace never loses a count.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::error::{ConsistencyWarning, Result};
use crate::memory::{MemoryTrace, StrengthenOutcome, Tier};
use crate::tier::TierManager;

/// Applies recall reinforcement and tier promotion
pub struct ConsolidationEngine {
    tiers: Arc<TierManager>,
    threshold: f64,
}

impl ConsolidationEngine {
    pub fn new(tiers: Arc<TierManager>, consolidation_threshold: f64) -> Self {
        Self {
            tiers,
            threshold: consolidation_threshold,
        }
    }

    /// Strengthen one trace. `Ok(None)` when it no longer exists anywhere.
    pub fn strengthen(&self, trace: &MemoryTrace) -> Result<Option<StrengthenOutcome>> {
        match self.resolve(trace) {
            Some(stored) => self.apply(stored).map(Some),
            None => {
                tracing::debug!(id = %trace.id, "Strengthen target vanished");
                Ok(None)
            }
        }
    }

    /// Strengthen many traces with one lookup per known tier
    ///
    /// Traces without a tier hint, or missing from the hinted tier, are
    /// resolved individually. Each id is strengthened at most once. Failures
    /// are logged and skipped.
    pub fn strengthen_batch(&self, traces: &[MemoryTrace]) -> Vec<StrengthenOutcome> {
        let mut by_tier: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
        let mut unplaced: Vec<&MemoryTrace> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for trace in traces {
            if !trace.id.is_empty() && !seen.insert(trace.id.as_str()) {
                continue;
            }
            match trace.tier {
                Some(tier) if !trace.id.is_empty() => {
                    by_tier.entry(tier).or_default().push(trace.id.clone())
                }
                _ => unplaced.push(trace),
            }
        }

        let mut resolved: Vec<MemoryTrace> = Vec::with_capacity(traces.len());
        for (tier, ids) in &by_tier {
            let found = match self.tiers.get(*tier, ids) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(tier = %tier, "Batch lookup failed: {}", e);
                    Vec::new()
                }
            };
            let missing = ids
                .iter()
                .filter(|id| !found.iter().any(|t| &t.id == *id))
                .filter_map(|id| traces.iter().find(|t| &t.id == id));
            unplaced.extend(missing);
            resolved.extend(found);
        }

        let mut resolved_ids: HashSet<String> = resolved.iter().map(|t| t.id.clone()).collect();
        for trace in unplaced {
            if let Some(stored) = self.resolve_unplaced(trace) {
                if resolved_ids.insert(stored.id.clone()) {
                    resolved.push(stored);
                }
            }
        }

        resolved
            .into_iter()
            .filter_map(|stored| {
                let id = stored.id.clone();
                self.apply(stored)
                    .map_err(|e| tracing::warn!(id = %id, "Strengthen failed: {}", e))
                    .ok()
            })
            .collect()
    }

    fn resolve(&self, trace: &MemoryTrace) -> Option<MemoryTrace> {
        if let Some(tier) = trace.tier.filter(|_| !trace.id.is_empty()) {
            match self.tiers.get(tier, std::slice::from_ref(&trace.id)) {
                Ok(mut found) => {
                    if let Some(stored) = found.pop() {
                        return Some(stored);
                    }
                }
                Err(e) => tracing::warn!(tier = %tier, "Lookup failed: {}", e),
            }
        }
        self.resolve_unplaced(trace)
    }

    /// Id lookup across tiers, then the content fallback
    fn resolve_unplaced(&self, trace: &MemoryTrace) -> Option<MemoryTrace> {
        if !trace.id.is_empty() {
            if let Some(stored) = self.tiers.locate(&trace.id) {
                return Some(stored);
            }
        }
        let found = self.tiers.find_by_content(&trace.content);
        if found.is_some() {
            tracing::debug!("Strengthen target resolved by content");
        }
        found
    }

    fn apply(&self, mut stored: MemoryTrace) -> Result<StrengthenOutcome> {
        let from = stored.tier.unwrap_or(Tier::ShortTerm);
        let now = Utc::now();
        stored.recall_count = stored.recall_count.saturating_add(1);
        stored.last_recall = now;
        stored.timestamp = now;

        let score = stored.consolidation_score();
        let promote = score > self.threshold && from != Tier::LongTerm;

        if promote {
            self.tiers.add_to(Tier::LongTerm, stored.clone())?;
            if let Err(e) = self.tiers.delete(from, std::slice::from_ref(&stored.id)) {
                ConsistencyWarning::PartialMigration {
                    id: stored.id.clone(),
                    from,
                    to: Tier::LongTerm,
                    reason: e.to_string(),
                }
                .log();
            }
            tracing::debug!(id = %stored.id, from = %from, score, "Promoted to long-term");
        } else {
            self.tiers.update(from, std::slice::from_ref(&stored))?;
        }

        Ok(StrengthenOutcome {
            id: stored.id,
            recall_count: stored.recall_count,
            consolidation_score: score,
            tier: if promote { Tier::LongTerm } else { from },
            promoted: promote,
        })
    }
}
