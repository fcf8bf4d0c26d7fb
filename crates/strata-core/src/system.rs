//! Memory System facade
//!
//! Composes the tier manager, association graph and the recall,
//! consolidation, merge and forgetting engines behind a synchronous API.
//!
//! Every structural mutation runs under one process-wide write lock. Recall
//! searches without it and hands its results to a bounded background queue;
//! a single worker thread applies strengthening under the same lock, so a
//! recall never waits for a write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::analyzer::{Scores, TextAnalyzer};
use crate::associations::AssociationBuilder;
use crate::config::MemoryConfig;
use crate::consolidation::ConsolidationEngine;
use crate::embeddings::Embedder;
use crate::error::{MemoryError, Result};
use crate::forgetting::ForgettingEngine;
use crate::graph::GraphStore;
use crate::memory::{
    ForgetReport, MemorySnapshot, MemoryStats, MemoryTrace, MemoryType, MergeReport, Tier,
};
use crate::merge::MergeEngine;
use crate::recall::RecallEngine;
use crate::store::SqliteStore;
use crate::tier::TierManager;

// ============================================================================
// BATCH INPUT
// ============================================================================

/// One item of a bulk import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchItem {
    pub content: String,
    /// Used as-is when set; otherwise scored, or 0.5 when analysis is skipped
    pub importance: Option<f64>,
    pub emotional_intensity: Option<f64>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl BatchItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_scores(mut self, importance: f64, emotional_intensity: f64) -> Self {
        self.importance = Some(importance);
        self.emotional_intensity = Some(emotional_intensity);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<&str> for BatchItem {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}

impl From<String> for BatchItem {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

// ============================================================================
// SHARED CORE
// ============================================================================

struct Core {
    config: MemoryConfig,
    tiers: Arc<TierManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<dyn TextAnalyzer>,
    recall: RecallEngine,
    consolidation: ConsolidationEngine,
    merge: MergeEngine,
    forgetting: ForgettingEngine,
    associations: AssociationBuilder,
    write_lock: Mutex<()>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded unit carries no state, so a poisoned lock is still usable
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// BACKGROUND QUEUE
// ============================================================================

/// Work waiting for the background worker
///
/// Each recall's results stay a separate batch so a trace returned by `n`
/// recalls is strengthened `n` times.
#[derive(Default)]
struct Pending {
    strengthen: Vec<Vec<MemoryTrace>>,
    relink: Vec<MemoryTrace>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.strengthen.is_empty() && self.relink.is_empty()
    }
}

enum Signal {
    Wake,
    Barrier(oneshot::Sender<()>),
}

/// Bounded wake-up channel over an unbounded pending buffer
///
/// Producers never block and never lose work: a full channel means a wake-up
/// is already queued, and the worker drains everything pending when it
/// handles it.
struct BackgroundQueue {
    pending: Arc<Mutex<Pending>>,
    sender: Option<mpsc::Sender<Signal>>,
    worker: Option<JoinHandle<()>>,
}

fn lock_pending(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BackgroundQueue {
    fn start(core: Arc<Core>, capacity: usize) -> Result<Self> {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker_pending = Arc::clone(&pending);
        let worker = std::thread::Builder::new()
            .name("strata-background".to_string())
            .spawn(move || run_worker(core, worker_pending, receiver))?;
        Ok(Self {
            pending,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn strengthen(&self, traces: Vec<MemoryTrace>) {
        lock_pending(&self.pending).strengthen.push(traces);
        self.wake();
    }

    fn relink(&self, traces: Vec<MemoryTrace>) {
        lock_pending(&self.pending).relink.extend(traces);
        self.wake();
    }

    fn wake(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(Signal::Wake) {
            // Full: a queued wake-up will pick this work up
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Background worker stopped, work stays pending");
            }
        }
    }

    fn wait(&self) {
        debug_assert!(
            tokio::runtime::Handle::try_current().is_err(),
            "wait_for_background blocks the thread; call it outside the tokio runtime"
        );
        let Some(sender) = &self.sender else {
            return;
        };
        let (done, finished) = oneshot::channel();
        if sender.blocking_send(Signal::Barrier(done)).is_err() {
            return;
        }
        let _ = finished.blocking_recv();
    }
}

impl Drop for BackgroundQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is pending and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Background worker panicked");
            }
        }
    }
}

fn run_worker(core: Arc<Core>, pending: Arc<Mutex<Pending>>, mut receiver: mpsc::Receiver<Signal>) {
    while let Some(signal) = receiver.blocking_recv() {
        drain(&core, &pending);
        if let Signal::Barrier(done) = signal {
            let _ = done.send(());
        }
    }
    drain(&core, &pending);
    tracing::debug!("Background worker exiting");
}

fn drain(core: &Core, pending: &Mutex<Pending>) {
    let work = std::mem::take(&mut *lock_pending(pending));
    if work.is_empty() {
        return;
    }

    let _guard = core.lock();
    if !work.relink.is_empty() {
        match core.associations.relink(&work.relink) {
            Ok(_) => core.graph.mark_relinked(work.relink.iter().map(|t| t.id.clone())),
            Err(e) => tracing::warn!("Association rebuild failed: {}", e),
        }
    }

    let mut strengthened = 0;
    let mut promoted = 0;
    for batch in &work.strengthen {
        let outcomes = core.consolidation.strengthen_batch(batch);
        strengthened += outcomes.len();
        promoted += outcomes.iter().filter(|o| o.promoted).count();
    }
    tracing::debug!(
        batches = work.strengthen.len(),
        strengthened,
        promoted,
        "Applied strengthening"
    );
}

// ============================================================================
// FACADE
// ============================================================================

/// Tiered associative memory
///
/// `MemorySystem` is `Send + Sync`; share it behind an `Arc` to serve
/// concurrent callers. Dropping it drains the background queue.
pub struct MemorySystem {
    core: Arc<Core>,
    queue: BackgroundQueue,
}

impl MemorySystem {
    /// Open a persistent system: SQLite tiers and a JSON graph file inside
    /// the configured data directory
    pub fn open(
        config: MemoryConfig,
        analyzer: Arc<dyn TextAnalyzer>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(config.database_path()?, Arc::clone(&embedder))?;
        let tiers = TierManager::sqlite(&store, &config);
        let graph = GraphStore::load(config.graph_path()?);
        tracing::info!(
            database = %store.path().display(),
            degraded = graph.is_degraded(),
            "Opened memory system"
        );
        Self::from_parts(config, tiers, graph, analyzer, embedder)
    }

    /// An ephemeral system with in-memory tiers and an unpersisted graph
    pub fn in_memory(
        config: MemoryConfig,
        analyzer: Arc<dyn TextAnalyzer>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let tiers = TierManager::in_memory(Arc::clone(&embedder), &config);
        Self::from_parts(config, tiers, GraphStore::in_memory(), analyzer, embedder)
    }

    /// Assemble a system from explicit parts
    pub fn from_parts(
        config: MemoryConfig,
        tiers: TierManager,
        graph: GraphStore,
        analyzer: Arc<dyn TextAnalyzer>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        let tiers = Arc::new(tiers);
        let graph = Arc::new(graph);

        let core = Arc::new(Core {
            recall: RecallEngine::new(
                Arc::clone(&tiers),
                Arc::clone(&graph),
                Arc::clone(&analyzer),
                &config,
            ),
            consolidation: ConsolidationEngine::new(
                Arc::clone(&tiers),
                config.consolidation_threshold,
            ),
            merge: MergeEngine::new(
                Arc::clone(&tiers),
                Arc::clone(&graph),
                Arc::clone(&analyzer),
                embedder,
                &config,
            ),
            forgetting: ForgettingEngine::new(
                Arc::clone(&tiers),
                Arc::clone(&graph),
                config.forget_threshold,
            ),
            associations: AssociationBuilder::new(Arc::clone(&tiers), Arc::clone(&graph), &config),
            tiers,
            graph,
            analyzer,
            write_lock: Mutex::new(()),
            config,
        });

        let queue = BackgroundQueue::start(Arc::clone(&core), core.config.strengthen_queue_capacity)?;
        Ok(Self { core, queue })
    }

    /// Active configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.core.config
    }

    /// Tier manager, for direct inspection
    pub fn tiers(&self) -> &TierManager {
        &self.core.tiers
    }

    /// Association graph
    pub fn graph(&self) -> &GraphStore {
        &self.core.graph
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Score, tag and store a new memory in the tier chosen by the
    /// placement rule, then link it to related memories
    pub fn add_memory(&self, content: &str, memory_type: MemoryType) -> Result<String> {
        self.add_scored(content, memory_type, None)
    }

    /// Store a new memory directly in the working tier
    pub fn add_working_memory(&self, content: &str, memory_type: MemoryType) -> Result<String> {
        self.add_scored(content, memory_type, Some(Tier::Working))
    }

    fn add_scored(&self, content: &str, memory_type: MemoryType, tier: Option<Tier>) -> Result<String> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidInput("memory content is empty".to_string()));
        }

        // Analyzer calls happen before the write lock is taken
        let scores = self.score(content);
        let keywords = match self.core.analyzer.keywords(content, self.core.config.context_tags) {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!("Context tag extraction failed: {}", e);
                Vec::new()
            }
        };
        let trace = MemoryTrace::new(content, memory_type)
            .with_scores(scores.importance, scores.emotional_intensity)
            .with_tags(keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()));

        let _guard = self.core.lock();
        let stored = match tier {
            Some(tier) => self.core.tiers.add_to(tier, trace)?,
            None => self.core.tiers.add(trace)?,
        };
        if let Err(e) = self.core.associations.link_new(&stored, &keywords) {
            tracing::warn!(id = %stored.id, "Could not persist associations: {}", e);
        }

        tracing::debug!(
            id = %stored.id,
            tier = ?stored.tier,
            importance = stored.importance,
            emotional_intensity = stored.emotional_intensity,
            "Added memory"
        );
        Ok(stored.id)
    }

    fn score(&self, content: &str) -> Scores {
        match self.core.analyzer.score(content) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!("Scoring failed, using defaults: {}", e);
                Scores::default()
            }
        }
    }

    /// Bulk import into the configured batch tier with one collection write
    ///
    /// Without `skip_analysis` the analyzer scores items that lack scores;
    /// with it, missing scores default to 0.5. Tags come only from the items
    /// and no associations are built. Empty contents are skipped. Returns the
    /// new ids in input order.
    pub fn batch_add<I, T>(&self, items: I, memory_type: MemoryType, skip_analysis: bool) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = T>,
        T: Into<BatchItem>,
    {
        let defaults = Scores::default();
        let traces: Vec<MemoryTrace> = items
            .into_iter()
            .map(Into::into)
            .filter(|item: &BatchItem| !item.content.trim().is_empty())
            .map(|item| {
                let needs_scores = item.importance.is_none() || item.emotional_intensity.is_none();
                let scores = if skip_analysis || !needs_scores {
                    defaults
                } else {
                    self.score(&item.content)
                };
                MemoryTrace::new(item.content, memory_type)
                    .with_scores(
                        item.importance.unwrap_or(scores.importance),
                        item.emotional_intensity.unwrap_or(scores.emotional_intensity),
                    )
                    .with_tags(item.tags)
                    .with_metadata(item.metadata)
            })
            .collect();

        if traces.is_empty() {
            return Ok(Vec::new());
        }

        let tier = self.core.config.batch_tier;
        let _guard = self.core.lock();
        let stored = self.core.tiers.add_batch_to(tier, traces)?;
        tracing::info!(count = stored.len(), tier = %tier, skip_analysis, "Batch import complete");
        Ok(stored.into_iter().map(|t| t.id).collect())
    }

    // ========================================================================
    // RECALL
    // ========================================================================

    /// Up to `limit` memories relevant to `query`
    ///
    /// Never fails and never blocks on writes. Returned traces are queued for
    /// strengthening in the background.
    pub fn recall_memory(&self, query: &str, limit: usize) -> Vec<MemoryTrace> {
        let results = self.core.recall.recall(query, limit);
        if results.is_empty() {
            return results;
        }

        if self.core.graph.is_degraded() {
            let orphans: Vec<MemoryTrace> = results
                .iter()
                .filter(|t| self.core.graph.needs_relink(&t.id))
                .cloned()
                .collect();
            if !orphans.is_empty() {
                self.queue.relink(orphans);
            }
        }

        self.queue.strengthen(results.clone());
        results
    }

    /// Block until every queued background job has been applied
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_for_background(&self) {
        self.queue.wait();
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Reconcile cross-tier duplicates and merge near-duplicates in every tier
    pub fn manual_maintenance(&self) -> Result<MergeReport> {
        self.merge_similar(false)
    }

    /// Merge near-duplicates, optionally only in working and short-term
    pub fn merge_similar(&self, short_only: bool) -> Result<MergeReport> {
        let _guard = self.core.lock();
        self.core.merge.merge_similar(short_only)
    }

    /// Evict memories whose forget score exceeds the threshold
    pub fn forget_old(&self, days: u32) -> Result<ForgetReport> {
        let _guard = self.core.lock();
        self.core.forgetting.forget_older_than(days)
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Per-tier counts and graph health
    pub fn stats(&self) -> Result<MemoryStats> {
        let [working, short_term, long_term] = self.core.tiers.counts()?;
        let (graph_nodes, graph_edges) = self.core.graph.read(|g| (g.node_count(), g.edge_count()));
        Ok(MemoryStats {
            working,
            short_term,
            long_term,
            graph_nodes,
            graph_edges,
            graph_degraded: self.core.graph.is_degraded(),
            cached_queries: self.core.recall.cached_queries(),
        })
    }

    /// Consistent snapshot of every tier and the graph
    pub fn export(&self) -> Result<MemorySnapshot> {
        let _guard = self.core.lock();
        Ok(MemorySnapshot {
            exported_at: Utc::now(),
            working: self.core.tiers.all(Tier::Working)?,
            short_term: self.core.tiers.all(Tier::ShortTerm)?,
            long_term: self.core.tiers.all(Tier::LongTerm)?,
            graph: self.core.graph.read(|g| g.to_map()),
        })
    }
}
