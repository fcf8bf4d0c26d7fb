//! Engine configuration
//!
//! Layered: built-in defaults, then an optional JSON file, then `STRATA_*`
//! environment variables.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::memory::Tier;

/// Engine thresholds, sizes and file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the database and graph file (`None` = platform default)
    pub data_dir: Option<PathBuf>,
    /// Collection names are `{prefix}_{tier}`
    pub collection_prefix: String,
    /// Graph file name inside `data_dir`
    pub graph_file: String,
    /// Database file name inside `data_dir`
    pub database_file: String,
    /// New traces above this importance land in long-term
    pub importance_threshold: f64,
    /// New traces above this emotional intensity land in long-term
    pub emotion_threshold: f64,
    /// importance × recall_count above this promotes to long-term
    pub consolidation_threshold: f64,
    /// Cosine similarity above this merges traces
    pub merge_threshold: f32,
    /// Neighbours examined per trace in a merge pass
    pub merge_neighbors: usize,
    /// Texts per embedding call during merge passes
    pub embed_batch_size: usize,
    /// Keywords extracted per recall query
    pub recall_keywords: usize,
    /// Queries whose keywords are cached
    pub keyword_cache_size: usize,
    /// Context tags extracted per new trace
    pub context_tags: usize,
    /// Similarity above this links a new trace to an existing one
    pub association_threshold: f32,
    /// Edges created per new trace
    pub max_associations: usize,
    /// Candidates examined per new trace
    pub association_candidates: usize,
    /// forget_score above this evicts a trace
    pub forget_threshold: f64,
    /// Tier receiving bulk imports
    pub batch_tier: Tier,
    /// Pending background strengthening jobs before new ones are dropped
    pub strengthen_queue_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            collection_prefix: "user_memories".to_string(),
            graph_file: "memory_graph.json".to_string(),
            database_file: "strata.db".to_string(),
            importance_threshold: 0.8,
            emotion_threshold: 0.8,
            consolidation_threshold: 0.5,
            merge_threshold: 0.95,
            merge_neighbors: 50,
            embed_batch_size: 100,
            recall_keywords: 3,
            keyword_cache_size: 1000,
            context_tags: 5,
            association_threshold: 0.6,
            max_associations: 5,
            association_candidates: 10,
            forget_threshold: 0.7,
            batch_tier: Tier::LongTerm,
            strengthen_queue_capacity: 256,
        }
    }
}

impl MemoryConfig {
    /// Read a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| MemoryError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STRATA_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(std::env::vars())
    }

    /// Apply `STRATA_*` overrides from an explicit variable list
    pub fn apply_vars<I>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix("STRATA_") else {
                continue;
            };
            match name {
                "DATA_DIR" => self.data_dir = Some(PathBuf::from(value)),
                "COLLECTION_PREFIX" => self.collection_prefix = value,
                "GRAPH_FILE" => self.graph_file = value,
                "IMPORTANCE_THRESHOLD" => self.importance_threshold = parse(&key, &value)?,
                "EMOTION_THRESHOLD" => self.emotion_threshold = parse(&key, &value)?,
                "CONSOLIDATION_THRESHOLD" => self.consolidation_threshold = parse(&key, &value)?,
                "MERGE_THRESHOLD" => self.merge_threshold = parse(&key, &value)?,
                "FORGET_THRESHOLD" => self.forget_threshold = parse(&key, &value)?,
                "KEYWORD_CACHE_SIZE" => self.keyword_cache_size = parse(&key, &value)?,
                "BATCH_TIER" => {
                    self.batch_tier = value.parse().map_err(MemoryError::Config)?;
                }
                "STRENGTHEN_QUEUE_CAPACITY" => {
                    self.strengthen_queue_capacity = parse(&key, &value)?;
                }
                _ => tracing::debug!(variable = %key, "Ignoring unknown STRATA_ variable"),
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(MemoryError::Config(format!("{} must be in [0, 1], got {}", name, v)))
            }
        };
        unit("importance_threshold", self.importance_threshold)?;
        unit("emotion_threshold", self.emotion_threshold)?;
        unit("merge_threshold", f64::from(self.merge_threshold))?;
        unit("association_threshold", f64::from(self.association_threshold))?;
        unit("forget_threshold", self.forget_threshold)?;
        if self.consolidation_threshold < 0.0 {
            return Err(MemoryError::Config(
                "consolidation_threshold must be non-negative".to_string(),
            ));
        }
        if self.collection_prefix.is_empty() {
            return Err(MemoryError::Config("collection_prefix must not be empty".to_string()));
        }
        if self.strengthen_queue_capacity == 0 || self.embed_batch_size == 0 {
            return Err(MemoryError::Config(
                "queue capacity and embed batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Collection name for a tier
    pub fn collection_name(&self, tier: Tier) -> String {
        format!("{}_{}", self.collection_prefix, tier.as_str())
    }

    /// Data directory, falling back to the platform data dir
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let proj_dirs = ProjectDirs::from("dev", "strata", "strata").ok_or_else(|| {
            MemoryError::Init("Could not determine project directories".to_string())
        })?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Full path of the graph file
    pub fn graph_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(&self.graph_file))
    }

    /// Full path of the database file
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(&self.database_file))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MemoryError::Config(format!("{}={}: {}", key, value, e)))
}
