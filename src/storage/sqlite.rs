//! SQLite embedding cache implementation.
//!
//! One table, `embeddings(text_hash, model, embedding, updated_at)`, keyed by
//! the content fingerprint. Writes are upserts. Each entry records the model
//! that produced it; lookups made under a different model name miss.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{decode_vector, encode_vector, fingerprint, EmbeddingCache, StorageError, StorageResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS embeddings (
        text_hash  TEXT PRIMARY KEY,
        model      TEXT NOT NULL,
        embedding  BLOB NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// Durable embedding cache backed by a SQLite file.
///
/// The connection sits behind a mutex, so one instance can be shared across
/// threads and tasks.
pub struct SqliteEmbeddingCache {
    conn: Mutex<Option<Connection>>,

    /// Model whose vectors this handle reads and writes
    model_name: String,

    /// Database location, `None` for in-memory caches
    db_path: Option<PathBuf>,
}

impl SqliteEmbeddingCache {
    /// Open (or create) the cache database at `path`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    /// Returns `StorageError` if the file cannot be opened or the schema
    /// cannot be created
    pub fn open(path: impl AsRef<Path>, model_name: impl Into<String>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::ConnectionError(format!(
                    "cannot create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Self::with_connection(conn, model_name.into(), Some(path.to_path_buf()))
    }

    /// Open a non-durable cache, for tests and throwaway runs.
    pub fn open_in_memory(model_name: impl Into<String>) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::with_connection(conn, model_name.into(), None)
    }

    fn with_connection(
        conn: Connection,
        model_name: String,
        db_path: Option<PathBuf>,
    ) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            model_name,
            db_path,
        })
    }

    /// Model name entries are tagged with.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Database file location, if durable.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of stored entries across all models.
    pub fn entry_count(&self) -> StorageResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(|e| StorageError::QueryError(e.to_string()))
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::Other("cache connection lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StorageError::Closed),
        }
    }
}

impl EmbeddingCache for SqliteEmbeddingCache {
    fn get(&self, text: &str) -> StorageResult<Option<Vec<f32>>> {
        let hash = fingerprint(text);
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT model, embedding FROM embeddings WHERE text_hash = ?1",
                params![hash],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .optional()
            .map_err(|e| StorageError::QueryError(e.to_string()))
        })?;

        match row {
            Some((model, blob)) if model == self.model_name => decode_vector(&blob).map(Some),
            Some((model, _)) => {
                debug!(hash = %hash, stored_model = %model, "ignoring cache entry from another model");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, text: &str, vector: &[f32]) -> StorageResult<()> {
        let hash = fingerprint(text);
        let blob = encode_vector(vector);
        let updated_at = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO embeddings (text_hash, model, embedding, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(text_hash) DO UPDATE SET
                     model = excluded.model,
                     embedding = excluded.embedding,
                     updated_at = excluded.updated_at",
                params![hash, self.model_name, blob, updated_at],
            )
            .map(|_| ())
            .map_err(|e| StorageError::QueryError(e.to_string()))
        })
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StorageError::Other("cache connection lock poisoned".to_string()))?;
        match guard.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| StorageError::ConnectionError(e.to_string())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SqliteEmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEmbeddingCache")
            .field("model_name", &self.model_name)
            .field("db_path", &self.db_path)
            .finish()
    }
}
