//! Association Graph
//!
//! Undirected adjacency between trace ids. The graph only ever stores ids,
//! never traces, and every mutation keeps edges symmetric.
//!
//! [`GraphStore`] owns the process-wide in-memory copy and its JSON file
//! (`{ "id": ["neighbour", ...] }`). The file is loaded once at startup and
//! rewritten after every structural mutation. A malformed file is moved
//! aside and replaced by an empty graph rather than aborting startup.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::Utc;

/// Graph persistence error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The persisted graph could not be parsed
    #[error("Graph file {path} is corrupt: {source}")]
    Corrupt {
        /// File that failed to parse
        path: PathBuf,
        /// Parse failure
        source: serde_json::Error,
    },
    /// Reading or writing the graph file failed
    #[error("Graph IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serializing the graph failed
    #[error("Graph serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// GRAPH
// ============================================================================

/// Symmetric id -> id adjacency map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl AssociationGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted map, adding missing reverse edges and dropping
    /// self loops. Returns the graph and the number of edges repaired.
    pub fn from_map(map: BTreeMap<String, Vec<String>>) -> (Self, usize) {
        let mut graph = Self::new();
        let mut repaired = 0;

        for (id, neighbors) in &map {
            for neighbor in neighbors {
                if neighbor == id {
                    repaired += 1;
                    continue;
                }
                let reciprocal = map.get(neighbor).is_some_and(|n| n.contains(id));
                if !reciprocal {
                    repaired += 1;
                }
                graph.link(id, neighbor);
            }
        }

        (graph, repaired)
    }

    /// Persistable form
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.adjacency
            .iter()
            .map(|(id, n)| (id.clone(), n.iter().cloned().collect()))
            .collect()
    }

    /// Add the undirected edge `a - b`. Returns false for self loops or
    /// edges that already exist.
    pub fn link(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let added = self
            .adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        added
    }

    /// Whether `id` has at least one neighbour
    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    /// Neighbours of `id`, sorted
    pub fn neighbors(&self, id: &str) -> Vec<String> {
        self.adjacency
            .get(id)
            .map(|n| n.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted union of the neighbours of `ids`, minus `ids` themselves
    pub fn neighbors_of_all(&self, ids: &[String]) -> Vec<String> {
        let members: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let union: BTreeSet<&String> = ids
            .iter()
            .filter_map(|id| self.adjacency.get(id))
            .flatten()
            .filter(|n| !members.contains(n.as_str()))
            .collect();
        union.into_iter().cloned().collect()
    }

    /// Remove `ids` and every edge touching them. Returns edges removed.
    pub fn remove_nodes(&mut self, ids: &[String]) -> usize {
        let mut removed = 0;
        let doomed: BTreeSet<&str> = ids.iter().map(String::as_str).collect();

        for id in &doomed {
            if let Some(neighbors) = self.adjacency.remove(*id) {
                for neighbor in neighbors {
                    if doomed.contains(neighbor.as_str()) {
                        // counted once from the lexically smaller side
                        if *id < neighbor.as_str() {
                            removed += 1;
                        }
                        continue;
                    }
                    removed += 1;
                    if let Some(back) = self.adjacency.get_mut(&neighbor) {
                        back.remove(*id);
                        if back.is_empty() {
                            self.adjacency.remove(&neighbor);
                        }
                    }
                }
            }
        }

        removed
    }

    /// Replace the `merged` ids with `new_id`: the new node inherits the
    /// union of their neighbours (minus the merged ids) with back-edges.
    pub fn rewire_merged(&mut self, merged: &[String], new_id: &str) {
        let inherited = self.neighbors_of_all(merged);
        self.remove_nodes(merged);
        for neighbor in inherited {
            if neighbor != new_id {
                self.link(new_id, &neighbor);
            }
        }
    }

    /// Nodes with at least one neighbour
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Undirected edge count
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Every edge has its reverse and there are no self loops
    pub fn is_symmetric(&self) -> bool {
        self.adjacency.iter().all(|(id, neighbors)| {
            neighbors.iter().all(|n| {
                n != id && self.adjacency.get(n).is_some_and(|back| back.contains(id))
            })
        })
    }
}

// ============================================================================
// PERSISTED STORE
// ============================================================================

/// Process-wide graph with load-on-init and flush-after-mutation
///
/// Readers take a short read lock and may observe a graph that is newer than
/// the file on disk. Mutations are expected to run on the engine's
/// serialized write path.
pub struct GraphStore {
    path: Option<PathBuf>,
    graph: RwLock<AssociationGraph>,
    degraded: AtomicBool,
    /// Ids whose associations were rebuilt while degraded
    relinked: Mutex<HashSet<String>>,
}

impl GraphStore {
    /// Graph that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            graph: RwLock::new(AssociationGraph::new()),
            degraded: AtomicBool::new(false),
            relinked: Mutex::new(HashSet::new()),
        }
    }

    /// Load the graph persisted at `path`
    ///
    /// A missing file yields an empty graph. An unreadable or malformed file
    /// yields an empty, degraded graph; a malformed file is renamed to
    /// `<name>.corrupt-<timestamp>` so the next flush does not destroy it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (graph, degraded) = match Self::read_file(&path) {
            Ok(Some((graph, repaired))) => {
                if repaired > 0 {
                    tracing::warn!(repaired, "Repaired asymmetric edges in association graph");
                }
                tracing::debug!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "Loaded association graph"
                );
                (graph, false)
            }
            Ok(None) => (AssociationGraph::new(), false),
            Err(e) => {
                tracing::warn!("Starting with an empty association graph: {}", e);
                if matches!(e, GraphError::Corrupt { .. }) {
                    Self::quarantine(&path);
                }
                (AssociationGraph::new(), true)
            }
        };

        Self {
            path: Some(path),
            graph: RwLock::new(graph),
            degraded: AtomicBool::new(degraded),
            relinked: Mutex::new(HashSet::new()),
        }
    }

    fn read_file(path: &Path) -> Result<Option<(AssociationGraph, usize)>, GraphError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GraphError::Io(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Some((AssociationGraph::new(), 0)));
        }
        let map: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&raw).map_err(|source| GraphError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Some(AssociationGraph::from_map(map)))
    }

    fn quarantine(path: &Path) {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
        let target = PathBuf::from(name);
        match std::fs::rename(path, &target) {
            Ok(()) => tracing::warn!(path = %target.display(), "Moved corrupt graph file aside"),
            Err(e) => tracing::warn!("Could not move corrupt graph file aside: {}", e),
        }
    }

    /// File backing this graph, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the graph was reset after a failed load
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Whether `id` already went through an association rebuild
    pub fn is_relinked(&self, id: &str) -> bool {
        self.relinked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Degraded, not in the graph, and not rebuilt yet
    ///
    /// A trace that has no related memories stays out of the graph after
    /// its rebuild; this keeps it from being queued again.
    pub fn needs_relink(&self, id: &str) -> bool {
        self.is_degraded() && !self.is_relinked(id) && !self.read(|g| g.contains(id))
    }

    /// Record ids whose associations have been rebuilt
    pub fn mark_relinked(&self, ids: impl IntoIterator<Item = String>) {
        self.relinked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids);
    }

    /// Read access
    pub fn read<R>(&self, f: impl FnOnce(&AssociationGraph) -> R) -> R {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        f(&graph)
    }

    /// Apply a mutation and flush the result
    ///
    /// The in-memory graph keeps the change even when the flush fails.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut AssociationGraph) -> R) -> Result<R, GraphError> {
        let result = {
            let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut graph)
        };
        self.flush()?;
        Ok(result)
    }

    /// Write the graph to disk (temp file + rename)
    pub fn flush(&self) -> Result<(), GraphError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = self.read(|g| serde_json::to_string(&g.to_map()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
