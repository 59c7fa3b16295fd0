use std::sync::Arc;

use coffer_crypto::{AesGcmEncryption, Encryption};
use coffer_index::{SerializableDb, SqliteDb};
use coffer_store::{BlobStore, BlobStoreGetter, InMemoryBlobStore, RepoBlobStoreGetter};

/// The collaborators repositories are created and opened with.
#[derive(Clone)]
pub struct Backend {
    pub db: Arc<dyn SerializableDb>,
    pub stores: Arc<dyn BlobStoreGetter>,
    pub encryption: Arc<dyn Encryption>,
}

impl Backend {
    /// AES-GCM encryption over the given index factory and stores.
    pub fn new(db: Arc<dyn SerializableDb>, stores: Arc<dyn BlobStoreGetter>) -> Self {
        Self {
            db,
            stores,
            encryption: Arc::new(AesGcmEncryption),
        }
    }

    /// SQLite indexes over one shared blob store, scoped per repository.
    pub fn with_shared_store(store: Arc<dyn BlobStore>) -> Self {
        Self::new(
            Arc::new(SqliteDb::new()),
            Arc::new(RepoBlobStoreGetter::new(store)),
        )
    }

    /// Everything in memory. Used by tests and embedding.
    pub fn in_memory() -> Self {
        Self::with_shared_store(Arc::new(InMemoryBlobStore::new()))
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn Encryption>) -> Self {
        self.encryption = encryption;
        self
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
