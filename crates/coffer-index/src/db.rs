//! Async SQLite handle and index (de)serialization.
//!
//! All SQL runs on `tokio-rusqlite`'s dedicated thread. Only queries and
//! light row mapping belong inside [`IndexDb::call`]; hashing, encryption
//! and blob-store I/O happen outside it.
//!
//! A serialized index is a plain SQLite database file. Serializing runs
//! `VACUUM INTO` a scratch file and reads it back; loading writes the bytes
//! to a temporary file and opens that.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult};
use crate::migrations;

/// File name used inside a scratch directory when serializing.
const SNAPSHOT_FILE: &str = "index.sqlite";

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> IndexError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => IndexError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => IndexError::Connection("connection closed".to_string()),
        other => IndexError::Connection(other.to_string()),
    }
}

/// Factory for index databases that can be turned into bytes and back.
#[async_trait]
pub trait SerializableDb: Send + Sync {
    /// Open a database from a serialized image, or a fresh empty one.
    /// The schema is migrated to the current version either way.
    async fn create(&self, image: Option<&[u8]>) -> IndexResult<IndexDb>;
}

/// SQLite-backed [`SerializableDb`].
#[derive(Debug, Clone, Default)]
pub struct SqliteDb {
    scratch_dir: Option<PathBuf>,
}

impl SqliteDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put temporary database images under `dir` instead of the system
    /// temp directory.
    pub fn with_scratch_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl SerializableDb for SqliteDb {
    async fn create(&self, image: Option<&[u8]>) -> IndexResult<IndexDb> {
        match image {
            Some(bytes) => IndexDb::from_image(bytes, self.scratch_dir.clone()).await,
            None => IndexDb::open_in_memory(self.scratch_dir.clone()).await,
        }
    }
}

/// Handle to one index database.
///
/// Cloning is cheap; clones share the same connection, which is how several
/// branch handles of one repository see the same index.
#[derive(Clone)]
pub struct IndexDb {
    conn: Connection,
    scratch_dir: Option<PathBuf>,
    // Keeps the backing file of a loaded image alive while any clone exists.
    _image: Option<Arc<NamedTempFile>>,
}

impl IndexDb {
    /// A fresh, empty, migrated in-memory database.
    pub async fn open_in_memory(scratch_dir: Option<PathBuf>) -> IndexResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;
        let db = Self {
            conn,
            scratch_dir,
            _image: None,
        };
        db.configure().await?;
        debug!("fresh index database opened");
        Ok(db)
    }

    /// Load a serialized image produced by [`IndexDb::serialize`].
    pub async fn from_image(bytes: &[u8], scratch_dir: Option<PathBuf>) -> IndexResult<Self> {
        let file = match &scratch_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                tempfile::Builder::new()
                    .prefix("coffer-index-")
                    .suffix(".sqlite")
                    .tempfile_in(dir)?
            }
            None => tempfile::Builder::new()
                .prefix("coffer-index-")
                .suffix(".sqlite")
                .tempfile()?,
        };
        tokio::fs::write(file.path(), bytes).await?;

        let conn = Connection::open(file.path())
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;
        let db = Self {
            conn,
            scratch_dir,
            _image: Some(Arc::new(file)),
        };
        db.configure().await?;
        debug!(bytes = bytes.len(), "index database loaded");
        Ok(db)
    }

    async fn configure(&self) -> IndexResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
            .await?;
        self.call(|conn| migrations::run_migrations(conn)).await
    }

    /// Run a closure on the database thread.
    pub async fn call<F, T>(&self, f: F) -> IndexResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> IndexResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Carry our own result through tokio-rusqlite's Ok variant so index
        // errors survive the thread hop unchanged.
        let outer = self.conn.call(move |conn| Ok(f(conn))).await;
        match outer {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Run a closure that only produces `rusqlite` errors.
    pub async fn call_sqlite<F, T>(&self, f: F) -> IndexResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// The whole database as the bytes of a standalone SQLite file.
    pub async fn serialize(&self) -> IndexResult<Vec<u8>> {
        let dir = match &self.scratch_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                tempfile::tempdir_in(dir)?
            }
            None => tempfile::tempdir()?,
        };
        let target = dir.path().join(SNAPSHOT_FILE);
        let target_str = path_str(&target)?;
        self.call_sqlite(move |conn| conn.execute("VACUUM INTO ?1", [target_str]))
            .await?;
        let bytes = tokio::fs::read(&target).await?;
        info!(bytes = bytes.len(), "index serialized");
        Ok(bytes)
    }
}

impl std::fmt::Debug for IndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDb")
            .field("scratch_dir", &self.scratch_dir)
            .field("loaded_from_image", &self._image.is_some())
            .finish()
    }
}

fn path_str(path: &Path) -> IndexResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| IndexError::Connection(format!("non UTF-8 scratch path {}", path.display())))
}
