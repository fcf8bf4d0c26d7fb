//! Recall Engine
//!
//! Hybrid keyword + semantic retrieval across tiers, topped up through the
//! association graph.
//!
//! For each tier in recall order (working, short-term, long-term):
//! 1. traces containing every query keyword
//! 2. traces containing any query keyword
//! 3. nearest neighbours of the query
//!
//! Each step asks only for the remaining quota. If the tiers run dry the
//! neighbours of already-found traces are appended. Results never contain
//! the query text itself and never repeat a content string; the first
//! occurrence wins. Failures are logged and skipped, so recall cannot fail.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::analyzer::TextAnalyzer;
use crate::config::MemoryConfig;
use crate::graph::GraphStore;
use crate::memory::{MemoryTrace, Tier};
use crate::store::ContainsFilter;
use crate::tier::TierManager;

const DEFAULT_CACHE_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);

/// Which search step produced a batch of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AllKeywords,
    AnyKeyword,
    Semantic,
}

impl Step {
    fn as_str(&self) -> &'static str {
        match self {
            Step::AllKeywords => "all-keywords",
            Step::AnyKeyword => "any-keyword",
            Step::Semantic => "semantic",
        }
    }
}

/// Accumulates results while enforcing exclusion and dedup
struct Collector<'q> {
    query: &'q str,
    limit: usize,
    seen_contents: HashSet<String>,
    seen_ids: HashSet<String>,
    results: Vec<MemoryTrace>,
}

impl<'q> Collector<'q> {
    fn new(query: &'q str, limit: usize) -> Self {
        Self {
            query,
            limit,
            seen_contents: HashSet::new(),
            seen_ids: HashSet::new(),
            results: Vec::with_capacity(limit),
        }
    }

    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.results.len())
    }

    fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    fn offer(&mut self, trace: MemoryTrace) -> bool {
        if self.is_full()
            || trace.content.trim().is_empty()
            || trace.content == self.query
            || trace.content.trim() == self.query.trim()
            || self.seen_ids.contains(&trace.id)
            || self.seen_contents.contains(&trace.content)
        {
            return false;
        }
        self.seen_ids.insert(trace.id.clone());
        self.seen_contents.insert(trace.content.clone());
        self.results.push(trace);
        true
    }

    fn ids(&self) -> Vec<String> {
        self.results.iter().map(|t| t.id.clone()).collect()
    }
}

/// Retrieval over the tier manager and association graph
pub struct RecallEngine {
    tiers: Arc<TierManager>,
    graph: Arc<GraphStore>,
    analyzer: Arc<dyn TextAnalyzer>,
    keyword_cache: Mutex<LruCache<String, Vec<String>>>,
    keywords_per_query: usize,
}

impl RecallEngine {
    /// Create an engine with an empty keyword cache
    pub fn new(
        tiers: Arc<TierManager>,
        graph: Arc<GraphStore>,
        analyzer: Arc<dyn TextAnalyzer>,
        config: &MemoryConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.keyword_cache_size).unwrap_or(DEFAULT_CACHE_SIZE);
        Self {
            tiers,
            graph,
            analyzer,
            keyword_cache: Mutex::new(LruCache::new(capacity)),
            keywords_per_query: config.recall_keywords,
        }
    }

    /// Keywords for `query`, served from the LRU cache when possible.
    /// Analyzer failures yield no keywords and are not cached.
    pub fn keywords(&self, query: &str) -> Vec<String> {
        let cached = self
            .keyword_cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(query).cloned());
        if let Some(hit) = cached {
            return hit;
        }

        match self.analyzer.keywords(query, self.keywords_per_query) {
            Ok(raw) => {
                let mut keywords: Vec<String> = Vec::with_capacity(self.keywords_per_query);
                for k in raw.into_iter().map(|k| k.trim().to_string()) {
                    if !k.is_empty() && !keywords.contains(&k) {
                        keywords.push(k);
                    }
                }
                keywords.truncate(self.keywords_per_query);

                if let Ok(mut cache) = self.keyword_cache.lock() {
                    cache.put(query.to_string(), keywords.clone());
                }
                keywords
            }
            Err(e) => {
                tracing::warn!("Keyword extraction failed, continuing without keywords: {}", e);
                Vec::new()
            }
        }
    }

    /// Number of cached keyword sets
    pub fn cached_queries(&self) -> usize {
        self.keyword_cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Up to `limit` traces relevant to `query`, best first
    pub fn recall(&self, query: &str, limit: usize) -> Vec<MemoryTrace> {
        if limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let keywords = self.keywords(query);
        let mut collector = Collector::new(query, limit);

        for tier in Tier::ALL {
            if collector.is_full() {
                break;
            }
            if !keywords.is_empty() {
                self.run_step(&mut collector, tier, Step::AllKeywords, &keywords);
                if keywords.len() > 1 && !collector.is_full() {
                    self.run_step(&mut collector, tier, Step::AnyKeyword, &keywords);
                }
            }
            if !collector.is_full() {
                self.run_step(&mut collector, tier, Step::Semantic, &keywords);
            }
        }

        if !collector.is_full() && !collector.results.is_empty() {
            self.expand_through_graph(&mut collector);
        }

        tracing::debug!(
            query_len = query.len(),
            keywords = keywords.len(),
            returned = collector.results.len(),
            "Recall complete"
        );
        collector.results
    }

    fn run_step(&self, collector: &mut Collector<'_>, tier: Tier, step: Step, keywords: &[String]) {
        let filter = match step {
            Step::AllKeywords => Some(ContainsFilter::all(keywords.iter().cloned())),
            Step::AnyKeyword => Some(ContainsFilter::any(keywords.iter().cloned())),
            Step::Semantic => None,
        };

        match self
            .tiers
            .query(tier, collector.query, collector.remaining(), filter.as_ref())
        {
            Ok(hits) => {
                let accepted = hits
                    .into_iter()
                    .filter(|h| collector.offer(h.trace.clone()))
                    .count();
                tracing::debug!(tier = %tier, step = step.as_str(), accepted, "Recall step");
            }
            Err(e) => {
                tracing::warn!(tier = %tier, step = step.as_str(), "Recall step failed: {}", e);
            }
        }
    }

    fn expand_through_graph(&self, collector: &mut Collector<'_>) {
        let found = collector.ids();
        let neighbor_ids = self.graph.read(|g| g.neighbors_of_all(&found));
        if neighbor_ids.is_empty() {
            return;
        }
        for trace in self.tiers.get_any(&neighbor_ids) {
            if collector.is_full() {
                break;
            }
            collector.offer(trace);
        }
    }
}
