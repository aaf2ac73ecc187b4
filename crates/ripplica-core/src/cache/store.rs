//! Vector storage for cache entries
//!
//! Embeddings are stored as little-endian f32 BLOBs and compared with cosine
//! distance computed in Rust.

use crate::error::{Result, RipplicaError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A cached (query, answer) pair keyed by the query's embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: Uuid,
    pub query_text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub answer_text: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        query_text: impl Into<String>,
        embedding: Vec<f32>,
        answer_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query_text: query_text.into(),
            embedding,
            answer_text: answer_text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A stored entry and its cosine distance from the query vector
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub entry: CacheEntry,
    pub distance: f32,
}

/// Nearest-neighbor store over cache entries
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `k` entries ordered by ascending distance
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    async fn insert(&self, entry: CacheEntry) -> Result<()>;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    /// All entries, oldest first
    async fn entries(&self) -> Result<Vec<CacheEntry>>;
}

/// Convert f32 embedding to bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embeddings.
///
/// Mismatched lengths, empty input or a zero-norm vector yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

fn rank_neighbors(entries: Vec<CacheEntry>, query: &[f32], k: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = entries
        .into_iter()
        .map(|entry| Neighbor {
            distance: cosine_distance(query, &entry.embedding),
            entry,
        })
        .collect();
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors.truncate(k);
    neighbors
}

fn check_dimensions(expected: Option<usize>, entry: &CacheEntry) -> Result<()> {
    if entry.embedding.is_empty() {
        return Err(RipplicaError::InvalidInput(
            "cache entry has an empty embedding".to_string(),
        ));
    }
    match expected {
        Some(dims) if dims != entry.embedding.len() => Err(RipplicaError::InvalidInput(format!(
            "embedding has {} dimensions, store holds {}",
            entry.embedding.len(),
            dims
        ))),
        _ => Ok(()),
    }
}

/// Process-local store, used in tests and when persistence is disabled
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<CacheEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| RipplicaError::Other(anyhow::anyhow!("cache store lock poisoned")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| RipplicaError::Other(anyhow::anyhow!("cache store lock poisoned")))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.read()?.clone();
        Ok(rank_neighbors(entries, embedding, k))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<()> {
        let mut entries = self.write()?;
        check_dimensions(entries.first().map(|e| e.embedding.len()), &entry)?;
        entries.push(entry);
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.read()?.clone())
    }
}

const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Cached answers keyed by query embedding
CREATE TABLE IF NOT EXISTS cache_entries (
    id TEXT PRIMARY KEY,
    query_text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    answer_text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_created ON cache_entries(created_at);
"#;

/// SQLite-backed store
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (creating if needed) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RipplicaError::Other(anyhow::anyhow!("cache database lock poisoned")))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn load_all(conn: &Connection) -> Result<Vec<CacheEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, query_text, embedding, answer_text, created_at
             FROM cache_entries ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, query_text, blob, answer_text, created_at) = row?;
            let id = match Uuid::parse_str(&id) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("Skipping cache row with bad id '{}': {}", id, e);
                    continue;
                }
            };
            let created_at = match DateTime::parse_from_rfc3339(&created_at) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!("Skipping cache row {} with bad timestamp '{}': {}", id, created_at, e);
                    continue;
                }
            };
            entries.push(CacheEntry {
                id,
                query_text,
                embedding: bytes_to_embedding(&blob),
                answer_text,
                created_at,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = {
            let conn = self.conn()?;
            Self::load_all(&conn)?
        };
        Ok(rank_neighbors(entries, embedding, k))
    }

    async fn insert(&self, entry: CacheEntry) -> Result<()> {
        let conn = self.conn()?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = (|| {
            let stored = conn
                .query_row("SELECT dimensions FROM cache_entries LIMIT 1", [], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?
                .map(|d| d as usize);
            check_dimensions(stored, &entry)?;

            conn.execute(
                "INSERT INTO cache_entries (id, query_text, embedding, dimensions, answer_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.id.to_string(),
                    entry.query_text,
                    embedding_to_bytes(&entry.embedding),
                    entry.embedding.len() as i64,
                    entry.answer_text,
                    entry.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }
        result
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM cache_entries", [])?;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn()?;
        Self::load_all(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_roundtrip() {
        let original = vec![1.0f32, 2.0, 3.0, -1.5];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes), original);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_in_memory_nearest_orders_by_distance() {
        let store = InMemoryVectorStore::new();
        store
            .insert(CacheEntry::new("far", vec![0.0, 1.0], "a"))
            .await
            .unwrap();
        store
            .insert(CacheEntry::new("near", vec![1.0, 0.1], "b"))
            .await
            .unwrap();

        let neighbors = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].entry.query_text, "near");
        assert!(neighbors[0].distance < neighbors[1].distance);

        assert_eq!(store.nearest(&[1.0, 0.0], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store
            .insert(CacheEntry::new("q", vec![1.0, 0.0], "a"))
            .await
            .unwrap();
        let err = store
            .insert(CacheEntry::new("q2", vec![1.0, 0.0, 0.0], "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, RipplicaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_sqlite_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store
                .insert(CacheEntry::new("what is rust", vec![0.5, 0.5, 0.0], "A language."))
                .await
                .unwrap();
            assert_eq!(store.count().await.unwrap(), 1);
        }

        let store = SqliteVectorStore::open(&path).unwrap();
        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].query_text, "what is rust");
        assert_eq!(entries[0].embedding, vec![0.5, 0.5, 0.0]);

        let nearest = store.nearest(&[0.5, 0.5, 0.0], 3).await.unwrap();
        assert!(nearest[0].distance.abs() < 1e-6);

        let err = store
            .insert(CacheEntry::new("x", vec![1.0], "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, RipplicaError::InvalidInput(_)));
        assert_eq!(store.count().await.unwrap(), 1);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    fn insert_raw(store: &SqliteVectorStore, id: &str, dimensions: &str, created_at: &str) {
        let conn = store.conn().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (id, query_text, embedding, dimensions, answer_text, created_at)
             VALUES (?1, 'raw', ?2, ?3, 'answer', ?4)",
            params![id, embedding_to_bytes(&[1.0, 0.0]), dimensions, created_at],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_skips_rows_with_bad_timestamps() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        insert_raw(&store, &Uuid::new_v4().to_string(), "2", "yesterday-ish");
        store
            .insert(CacheEntry::new("good", vec![1.0, 0.0], "kept"))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].query_text, "good");
        assert_eq!(store.nearest(&[1.0, 0.0], 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_dimension_read_errors_propagate() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        insert_raw(&store, &Uuid::new_v4().to_string(), "two", &Utc::now().to_rfc3339());

        let err = store
            .insert(CacheEntry::new("q", vec![1.0, 0.0, 0.0], "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, RipplicaError::Database(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
