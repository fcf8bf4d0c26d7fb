//! Test Memory Manager
//!
//! Provides isolated memory systems for testing:
//! - In-memory tiers for fast scenario tests
//! - SQLite tiers and a graph file in a temporary directory
//! - Tiers whose operations can be made to fail
//! - Reopening a persistent system to check what survived

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use strata_core::{
    Embedder, GraphStore, MemoryConfig, MemorySystem, MemoryTrace, TextAnalyzer, Tier, TierManager,
};
use tempfile::TempDir;

use crate::mocks::{CountingAnalyzer, FailingCollection, FixtureEmbedder};

/// Storage behind a [`TestMemory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Sqlite,
    Failing,
}

/// An isolated memory system with inspectable collaborators
///
/// # Example
///
/// ```rust,ignore
/// let t = TestMemory::in_memory();
/// t.memory.add_memory("I like coffee", MemoryType::Episodic)?;
/// assert_eq!(t.analyzer.score_calls(), 1);
/// // The temporary directory is deleted when `t` is dropped
/// ```
pub struct TestMemory {
    pub memory: MemorySystem,
    pub analyzer: Arc<CountingAnalyzer>,
    pub embedder: Arc<FixtureEmbedder>,
    pub config: MemoryConfig,
    backend: Backend,
    failing: Option<[Arc<FailingCollection>; 3]>,
    temp_dir: TempDir,
}

impl TestMemory {
    /// In-memory tiers, default config, coffee fixtures
    pub fn in_memory() -> Self {
        Self::build(Backend::InMemory, MemoryConfig::default(), CountingAnalyzer::new(), FixtureEmbedder::coffee())
    }

    /// SQLite tiers and a persisted graph in a temporary directory
    pub fn sqlite() -> Self {
        Self::build(Backend::Sqlite, MemoryConfig::default(), CountingAnalyzer::new(), FixtureEmbedder::coffee())
    }

    /// In-memory tiers whose operations can be made to fail
    pub fn failing() -> Self {
        Self::build(Backend::Failing, MemoryConfig::default(), CountingAnalyzer::new(), FixtureEmbedder::coffee())
    }

    /// Fully custom construction
    pub fn build(
        backend: Backend,
        config: MemoryConfig,
        analyzer: CountingAnalyzer,
        embedder: FixtureEmbedder,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::assemble(backend, config, Arc::new(analyzer), Arc::new(embedder), temp_dir)
    }

    fn assemble(
        backend: Backend,
        mut config: MemoryConfig,
        analyzer: Arc<CountingAnalyzer>,
        embedder: Arc<FixtureEmbedder>,
        temp_dir: TempDir,
    ) -> Self {
        config.data_dir = Some(temp_dir.path().to_path_buf());
        let dyn_analyzer: Arc<dyn TextAnalyzer> = analyzer.clone();
        let dyn_embedder: Arc<dyn Embedder> = embedder.clone();

        let (memory, failing) = match backend {
            Backend::InMemory => (
                MemorySystem::in_memory(config.clone(), dyn_analyzer, dyn_embedder),
                None,
            ),
            Backend::Sqlite => (
                MemorySystem::open(config.clone(), dyn_analyzer, dyn_embedder),
                None,
            ),
            Backend::Failing => {
                let make = |tier: Tier| {
                    Arc::new(FailingCollection::new(
                        config.collection_name(tier),
                        Arc::clone(&dyn_embedder),
                    ))
                };
                let collections = [make(Tier::Working), make(Tier::ShortTerm), make(Tier::LongTerm)];
                let tiers = TierManager::new(
                    collections[0].clone(),
                    collections[1].clone(),
                    collections[2].clone(),
                    &config,
                );
                (
                    MemorySystem::from_parts(
                        config.clone(),
                        tiers,
                        GraphStore::in_memory(),
                        dyn_analyzer,
                        dyn_embedder,
                    ),
                    Some(collections),
                )
            }
        };

        Self {
            memory: memory.expect("Failed to create test memory system"),
            analyzer,
            embedder,
            config,
            backend,
            failing,
            temp_dir,
        }
    }

    /// Drop the system and open it again over the same directory
    pub fn reopen(self) -> Self {
        let Self {
            memory,
            analyzer,
            embedder,
            config,
            backend,
            temp_dir,
            ..
        } = self;
        drop(memory);
        Self::assemble(backend, config, analyzer, embedder, temp_dir)
    }

    /// Failure switches for a tier (failing backend only)
    pub fn tier_switch(&self, tier: Tier) -> &FailingCollection {
        let collections = self
            .failing
            .as_ref()
            .expect("tier switches need the failing backend");
        let index = Tier::ALL
            .iter()
            .position(|t| *t == tier)
            .expect("tier is listed in Tier::ALL");
        &collections[index]
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir().join(&self.config.graph_file)
    }

    /// Every stored trace, tier order
    pub fn all_traces(&self) -> Vec<MemoryTrace> {
        let snapshot = self.memory.export().expect("export");
        let mut all = snapshot.working;
        all.extend(snapshot.short_term);
        all.extend(snapshot.long_term);
        all
    }

    pub fn total(&self) -> usize {
        self.memory.stats().expect("stats").total()
    }

    /// Stored copy of `id`, if any
    pub fn get(&self, id: &str) -> Option<MemoryTrace> {
        self.memory.tiers().locate(id)
    }

    /// Panic unless every id is held by exactly one tier
    pub fn assert_single_owner(&self) {
        let ids: HashSet<String> = self.all_traces().into_iter().map(|t| t.id).collect();
        for id in ids {
            let held = self.memory.tiers().tiers_holding(&id);
            assert_eq!(held.len(), 1, "trace {} held by {:?}", id, held);
        }
    }

    /// Panic unless the association graph is symmetric
    pub fn assert_graph_symmetric(&self) {
        assert!(
            self.memory.graph().read(|g| g.is_symmetric()),
            "association graph is not symmetric"
        );
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}
