//! SQLite Tier Store
//!
//! One database file holds every tier. Each [`SqliteCollection`] is a named
//! view over the shared `records` table. Vectors are stored as little-endian
//! f32 BLOBs next to the model that produced them and ranked in process.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use super::{rank_by_distance, ContainsFilter, QueryHit, Result, StoreError, VectorCollection};
use crate::embeddings::{Embedder, Embedding};
use crate::memory::{MemoryTrace, MemoryType};

/// Metadata column contents (everything except id and document)
#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    timestamp: DateTime<Utc>,
    importance: f64,
    emotional_intensity: f64,
    #[serde(default)]
    context_tags: BTreeSet<String>,
    #[serde(default)]
    recall_count: u32,
    last_recall: DateTime<Utc>,
    #[serde(default)]
    memory_type: MemoryType,
    #[serde(default)]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl From<&MemoryTrace> for StoredMetadata {
    fn from(trace: &MemoryTrace) -> Self {
        Self {
            timestamp: trace.timestamp,
            importance: trace.importance,
            emotional_intensity: trace.emotional_intensity,
            context_tags: trace.context_tags.clone(),
            recall_count: trace.recall_count,
            last_recall: trace.last_recall,
            memory_type: trace.memory_type,
            attributes: trace.metadata.clone(),
        }
    }
}

impl StoredMetadata {
    fn into_trace(self, id: String, content: String) -> MemoryTrace {
        let mut trace = MemoryTrace {
            id,
            content,
            timestamp: self.timestamp,
            importance: self.importance,
            emotional_intensity: self.emotional_intensity,
            context_tags: self.context_tags,
            recall_count: self.recall_count,
            last_recall: self.last_recall,
            memory_type: self.memory_type,
            metadata: self.attributes,
            tier: None,
        };
        trace.normalize_scores();
        trace
    }
}

struct Row {
    id: String,
    document: String,
    metadata: String,
    embedding: Option<Vec<u8>>,
    embedding_model: Option<String>,
}

// ============================================================================
// STORE
// ============================================================================

/// Shared SQLite database backing the tier collections
///
/// Uses separate reader/writer connections; all methods take `&self`.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
}

impl SqliteStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;
             PRAGMA journal_size_limit = 67108864;",
        )?;
        Ok(())
    }

    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        tracing::debug!(path = %path.display(), model = embedder.model_name(), "Opened tier store");

        Ok(Arc::new(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            embedder,
            path,
        }))
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A named collection over this store
    pub fn collection(self: &Arc<Self>, name: impl Into<String>) -> SqliteCollection {
        SqliteCollection {
            store: Arc::clone(self),
            name: name.into(),
        }
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::LockPoisoned("Reader lock poisoned".to_string()))
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::LockPoisoned("Writer lock poisoned".to_string()))
    }

    fn select(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        filter: Option<&ContainsFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        if matches!(ids, Some([])) {
            return Ok(vec![]);
        }

        let mut sql = String::from(
            "SELECT id, document, metadata, embedding, embedding_model
             FROM records WHERE collection = ?",
        );
        let mut args: Vec<String> = vec![collection.to_string()];

        if let Some(ids) = ids {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND id IN ({})", placeholders));
            args.extend(ids.iter().cloned());
        }

        if let Some(filter) = filter {
            let (clause, values) = filter_clause(filter);
            sql.push_str(&format!(" AND ({})", clause));
            args.extend(values);
        }

        sql.push_str(" ORDER BY seq");
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(Row {
                    id: row.get(0)?,
                    document: row.get(1)?,
                    metadata: row.get(2)?,
                    embedding: row.get(3)?,
                    embedding_model: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_trace(row: &Row) -> Result<MemoryTrace> {
        let metadata: StoredMetadata = serde_json::from_str(&row.metadata)?;
        Ok(metadata.into_trace(row.id.clone(), row.document.clone()))
    }

    /// Decode stored vectors; rows written by another model are re-embedded
    fn vectors_for(&self, rows: &[Row]) -> Result<Vec<Embedding>> {
        let current = self.embedder.model_name();
        let mut out: Vec<Option<Embedding>> = rows
            .iter()
            .map(|row| match (&row.embedding, &row.embedding_model) {
                (Some(bytes), Some(model)) if model == current => Embedding::from_bytes(bytes),
                _ => None,
            })
            .collect();

        let stale: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_none())
            .map(|(i, _)| i)
            .collect();
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "Re-embedding records from another model");
            let texts: Vec<&str> = stale.iter().map(|&i| rows[i].document.as_str()).collect();
            let fresh = self.embedder.embed_batch(&texts)?;
            for (i, embedding) in stale.into_iter().zip(fresh) {
                out[i] = Some(embedding);
            }
        }

        Ok(out
            .into_iter()
            .map(|e| e.unwrap_or_else(|| Embedding::new(Vec::new())))
            .collect())
    }
}

fn filter_clause(filter: &ContainsFilter) -> (String, Vec<String>) {
    match filter {
        ContainsFilter::Contains(text) => ("instr(document, ?) > 0".to_string(), vec![text.clone()]),
        ContainsFilter::All(keywords) if keywords.is_empty() => ("1".to_string(), vec![]),
        ContainsFilter::Any(keywords) if keywords.is_empty() => ("0".to_string(), vec![]),
        ContainsFilter::All(keywords) => (
            vec!["instr(document, ?) > 0"; keywords.len()].join(" AND "),
            keywords.clone(),
        ),
        ContainsFilter::Any(keywords) => (
            vec!["instr(document, ?) > 0"; keywords.len()].join(" OR "),
            keywords.clone(),
        ),
    }
}

// ============================================================================
// COLLECTION
// ============================================================================

/// One tier's view over a [`SqliteStore`]
#[derive(Clone)]
pub struct SqliteCollection {
    store: Arc<SqliteStore>,
    name: String,
}

impl VectorCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn add(&self, traces: &[MemoryTrace]) -> Result<()> {
        if traces.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = traces.iter().map(|t| t.content.as_str()).collect();
        let embeddings = self.store.embedder.embed_batch(&texts)?;
        if embeddings.len() != traces.len() {
            return Err(StoreError::Rejected(format!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                traces.len()
            )));
        }
        let model = self.store.embedder.model_name().to_string();

        let mut writer = self.store.lock_writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (collection, id, document, metadata, embedding, embedding_model)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model",
            )?;
            for (trace, embedding) in traces.iter().zip(embeddings.iter()) {
                let metadata = serde_json::to_string(&StoredMetadata::from(trace))?;
                stmt.execute(params![
                    self.name,
                    trace.id,
                    trace.content,
                    metadata,
                    embedding.to_bytes(),
                    model,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(
        &self,
        ids: Option<&[String]>,
        filter: Option<&ContainsFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryTrace>> {
        self.store
            .select(&self.name, ids, filter, limit)?
            .iter()
            .map(SqliteStore::row_to_trace)
            .collect()
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
            Some(self.store.embedder.embed(text)?)
        };

        let rows = self.store.select(&self.name, None, filter, None)?;
        let vectors = self.store.vectors_for(&rows)?;
        let candidates = rows
            .iter()
            .zip(vectors)
            .map(|(row, vector)| SqliteStore::row_to_trace(row).map(|t| (t, vector)))
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_by_distance(query.as_ref(), candidates, n_results))
    }

    fn update(&self, traces: &[MemoryTrace]) -> Result<()> {
        if traces.is_empty() {
            return Ok(());
        }
        let mut writer = self.store.lock_writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE records SET metadata = ?1 WHERE collection = ?2 AND id = ?3")?;
            for trace in traces {
                let metadata = serde_json::to_string(&StoredMetadata::from(trace))?;
                stmt.execute(params![metadata, self.name, trace.id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.store.lock_writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM records WHERE collection = ?1 AND id = ?2")?;
            for id in ids {
                stmt.execute(params![self.name, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let reader = self.store.lock_reader()?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
