use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use coffer_index::SqliteDb;
use coffer_repo::Backend;
use coffer_store::{FileBlobStore, RepoBlobStoreGetter};
use serde::{Deserialize, Serialize};

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "coffer.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Root directory of the shared blob store.
    pub storage_root: PathBuf,
    /// Where temporary index images are written. System temp dir if unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(".storage/repos"),
            scratch_dir: None,
        }
    }
}

impl CliConfig {
    /// Load `path`, or `coffer.toml` if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn with_storage(mut self, storage: Option<PathBuf>) -> Self {
        if let Some(storage) = storage {
            self.storage_root = storage;
        }
        self
    }

    /// File-backed stores under `storage_root`, SQLite indexes.
    pub fn backend(&self) -> Backend {
        let db = match &self.scratch_dir {
            Some(dir) => SqliteDb::with_scratch_dir(dir),
            None => SqliteDb::new(),
        };
        let store = Arc::new(FileBlobStore::new(&self.storage_root));
        Backend::new(Arc::new(db), Arc::new(RepoBlobStoreGetter::new(store)))
    }
}
