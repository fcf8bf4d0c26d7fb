//! Forgetting Engine
//!
//! Scores every trace for eviction and deletes those above the threshold:
//!
//! ```text
//! forget_score = 0.4 × (1 − recency)
//!              + 0.3 × (1 − importance)
//!              + 0.2 × (1 − recall_factor)
//!              + 0.1 × (1 − association_factor)
//! ```
//!
//! `recency` falls linearly from 1 to 0 over the window, `recall_factor`
//! saturates at [`RECALL_SATURATION`] recalls and `association_factor` is
//! the mean importance of the trace's graph neighbours, floored at
//! [`ASSOCIATION_FLOOR`] (1.0 when it has none). All scores in a pass are computed from one snapshot taken at the
//! start of the call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::graph::GraphStore;
use crate::memory::{ForgetReport, MemoryTrace, Tier};
use crate::tier::TierManager;

/// Recalls after which the recall factor is 1
pub const RECALL_SATURATION: u32 = 5;

/// Lowest association factor a connected trace can get
pub const ASSOCIATION_FLOOR: f64 = 0.5;

const RECENCY_WEIGHT: f64 = 0.4;
const IMPORTANCE_WEIGHT: f64 = 0.3;
const RECALL_WEIGHT: f64 = 0.2;
const ASSOCIATION_WEIGHT: f64 = 0.1;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// 1 for a trace touched now, 0 for one untouched for `days` or more
pub fn recency(timestamp: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> f64 {
    let age = (now - timestamp).num_milliseconds() as f64 / 1000.0;
    if days == 0 {
        return if age <= 0.0 { 1.0 } else { 0.0 };
    }
    let window = f64::from(days) * SECONDS_PER_DAY;
    1.0 - (age.max(0.0) / window).min(1.0)
}

/// `min(1, recall_count / 5)`
pub fn recall_factor(recall_count: u32) -> f64 {
    (f64::from(recall_count) / f64::from(RECALL_SATURATION)).min(1.0)
}

/// Eviction score of `trace` given its association factor
pub fn forget_score(
    trace: &MemoryTrace,
    now: DateTime<Utc>,
    days: u32,
    association_factor: f64,
) -> f64 {
    RECENCY_WEIGHT * (1.0 - recency(trace.timestamp, now, days))
        + IMPORTANCE_WEIGHT * (1.0 - trace.importance)
        + RECALL_WEIGHT * (1.0 - recall_factor(trace.recall_count))
        + ASSOCIATION_WEIGHT * (1.0 - association_factor)
}

/// Scored eviction of stale traces
pub struct ForgettingEngine {
    tiers: Arc<TierManager>,
    graph: Arc<GraphStore>,
    threshold: f64,
}

impl ForgettingEngine {
    pub fn new(tiers: Arc<TierManager>, graph: Arc<GraphStore>, forget_threshold: f64) -> Self {
        Self {
            tiers,
            graph,
            threshold: forget_threshold,
        }
    }

    /// Mean importance of `id`'s neighbours present in `importance`, within
    /// `[ASSOCIATION_FLOOR, 1.0]`; 1.0 when there are none
    pub fn association_factor(&self, id: &str, importance: &HashMap<String, f64>) -> f64 {
        let known: Vec<f64> = self
            .graph
            .read(|g| g.neighbors(id))
            .iter()
            .filter_map(|n| importance.get(n).copied())
            .collect();
        if known.is_empty() {
            1.0
        } else {
            let mean = known.iter().sum::<f64>() / known.len() as f64;
            mean.clamp(ASSOCIATION_FLOOR, 1.0)
        }
    }

    /// Evict every trace whose forget_score exceeds the threshold
    ///
    /// A tier that cannot be read or deleted from is reported in
    /// `failed_tiers` and the rest of the pass continues. Failing to persist
    /// the graph afterwards fails the call.
    pub fn forget_older_than(&self, days: u32) -> Result<ForgetReport> {
        let now = Utc::now();
        let mut report = ForgetReport::default();

        let mut snapshot: Vec<(Tier, Vec<MemoryTrace>)> = Vec::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            match self.tiers.all(tier) {
                Ok(traces) => snapshot.push((tier, traces)),
                Err(e) => {
                    tracing::warn!(tier = %tier, "Forgetting skipped tier: {}", e);
                    report.failed_tiers.push(tier);
                }
            }
        }

        let importance: HashMap<String, f64> = snapshot
            .iter()
            .flat_map(|(_, traces)| traces.iter().map(|t| (t.id.clone(), t.importance)))
            .collect();

        for (tier, traces) in &snapshot {
            report.traces_scanned += traces.len();
            let doomed: Vec<String> = traces
                .iter()
                .filter(|t| {
                    let assoc = self.association_factor(&t.id, &importance);
                    forget_score(t, now, days, assoc) > self.threshold
                })
                .map(|t| t.id.clone())
                .collect();
            if doomed.is_empty() {
                continue;
            }

            match self.tiers.delete(*tier, &doomed) {
                Ok(()) => {
                    tracing::debug!(tier = %tier, count = doomed.len(), "Forgot traces");
                    report.forgotten_ids.extend(doomed);
                }
                Err(e) => {
                    tracing::warn!(tier = %tier, "Forgetting delete failed: {}", e);
                    report.failed_tiers.push(*tier);
                }
            }
        }

        if !report.forgotten_ids.is_empty() {
            let removed = self.graph.mutate(|g| g.remove_nodes(&report.forgotten_ids))?;
            tracing::debug!(edges = removed, "Pruned forgotten traces from graph");
        }

        report.duration_ms = (Utc::now() - now).num_milliseconds();
        tracing::info!(
            days,
            scanned = report.traces_scanned,
            forgotten = report.forgotten(),
            "Forgetting pass complete"
        );
        Ok(report)
    }
}
