use std::sync::Arc;

use chrono::{DateTime, Utc};
use coffer_crypto::{sha256, Encryption, EncryptionKey};
use coffer_index::{validate_branch_name, BlobInfo, IndexRepository, Snapshot};
use coffer_store::{blob_path, index_path, BlobStore, INDEX_NAME};
use coffer_tree::{validate_leaf_path, BlobEntry, DirItem, RepoLinkEntry, TreeBuilder};
use coffer_types::RepoId;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: DirEntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEntryKind {
    /// Times are milliseconds since the Unix epoch.
    File {
        size: u64,
        creation_time: i64,
        modification_time: i64,
    },
    Directory,
    RepoLink { repo_id: RepoId },
}

/// A handle on one branch of one repository.
///
/// Handles created with [`Repository::branch`] share the index database of
/// the handle they came from, so a snapshot on any of them persists the
/// state of every branch.
pub struct Repository {
    repo_id: RepoId,
    store: Arc<dyn BlobStore>,
    encryption: Arc<dyn Encryption>,
    index: IndexRepository,
    tree: TreeBuilder,
    config: RepoConfig,
}

impl Repository {
    /// Create a new repository with an empty index and store the encrypted
    /// index. Fails if the repository already has one.
    pub async fn create(repo_id: RepoId, backend: &Backend, config: RepoConfig) -> RepoResult<Self> {
        validate_branch_name(&config.branch)?;
        let store = backend.stores.store_for(&repo_id);
        if store.list(&[]).await?.iter().any(|name| name == INDEX_NAME) {
            return Err(RepoError::AlreadyExists(repo_id));
        }

        let db = backend.db.create(None).await?;
        let mut repo = Self {
            repo_id,
            store,
            encryption: Arc::clone(&backend.encryption),
            index: IndexRepository::new(db),
            tree: TreeBuilder::empty(),
            config,
        };
        repo.store_index().await?;
        repo.init().await?;
        info!(repo = %repo.repo_id, branch = %repo.config.branch, "repository created");
        Ok(repo)
    }

    /// Open an existing repository by decrypting its stored index.
    pub async fn open(repo_id: RepoId, backend: &Backend, config: RepoConfig) -> RepoResult<Self> {
        validate_branch_name(&config.branch)?;
        let store = backend.stores.store_for(&repo_id);
        let sealed = store.read(&index_path()).await?;
        let image = backend.encryption.decrypt(&sealed, &config.key)?;
        let db = backend.db.create(Some(&image)).await?;

        let mut repo = Self {
            repo_id,
            store,
            encryption: Arc::clone(&backend.encryption),
            index: IndexRepository::new(db),
            tree: TreeBuilder::empty(),
            config,
        };
        repo.init().await?;
        info!(repo = %repo.repo_id, branch = %repo.config.branch, "repository opened");
        Ok(repo)
    }

    /// A handle on another branch of this repository, sharing its store and
    /// index.
    pub async fn branch(&self, name: &str, inlined: bool) -> RepoResult<Self> {
        validate_branch_name(name)?;
        let mut repo = Self {
            repo_id: self.repo_id.clone(),
            store: Arc::clone(&self.store),
            encryption: Arc::clone(&self.encryption),
            index: self.index.clone(),
            tree: TreeBuilder::empty(),
            config: self.config.clone().with_branch(name).with_inlined(inlined),
        };
        repo.init().await?;
        Ok(repo)
    }

    /// Reset the tree overlay to the branch head.
    async fn init(&mut self) -> RepoResult<()> {
        self.tree = match self.index.read_latest_snapshot(&self.config.branch).await? {
            Some(head) => {
                debug!(branch = %self.config.branch, commit = %head.hash.short_hex(), "loaded branch head");
                TreeBuilder::from_root(head.tree)
            }
            None => TreeBuilder::empty(),
        };
        Ok(())
    }

    pub fn repo_id(&self) -> &RepoId {
        &self.repo_id
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn index(&self) -> &IndexRepository {
        &self.index
    }

    /// Whether there are inserts not yet captured by a snapshot.
    pub fn is_dirty(&self) -> bool {
        self.tree.is_dirty()
    }

    /// Store `data` at `path`. Times are milliseconds since the Unix epoch.
    ///
    /// Content already in the index is not encrypted or written again. The
    /// path is checked against the tree before anything is stored, so a
    /// rejected insert leaves no ciphertext or index rows behind.
    pub async fn insert_file(
        &mut self,
        path: &[String],
        data: &[u8],
        creation_time: i64,
        modification_time: i64,
    ) -> RepoResult<()> {
        validate_leaf_path(path)?;
        self.tree.check_insert_path(&self.index, path).await?;
        let hash = sha256(data);

        let content = match self.index.read_content(&hash).await? {
            Some(existing) => {
                debug!(hash = %hash.short_hex(), "content deduplicated");
                existing
            }
            None => {
                let info = if self.config.inlined {
                    BlobInfo::Inlined {
                        parts: vec![data.to_vec()],
                    }
                } else {
                    let key = EncryptionKey::generate();
                    let ciphertext = self.encryption.encrypt(data, &key)?;
                    let part = sha256(&ciphertext);
                    self.store.write(&blob_path(&part), &ciphertext).await?;
                    debug!(hash = %hash.short_hex(), part = %part.short_hex(), bytes = ciphertext.len(), "blob part written");
                    BlobInfo::Encrypted {
                        key,
                        parts: vec![part],
                    }
                };
                self.index.write_blob_info(&hash, &info).await?
            }
        };

        let entry = BlobEntry {
            content,
            size: data.len() as u64,
            creation_time,
            modification_time,
        };
        self.tree.insert_blob(&self.index, path, entry).await?;
        Ok(())
    }

    /// Link the repository `target` at `path`.
    pub async fn insert_repo_link(&mut self, path: &[String], target: &RepoId) -> RepoResult<()> {
        let link = RepoLinkEntry {
            repo_id: target.clone(),
        };
        self.tree.insert_repo_link(&self.index, path, link).await?;
        Ok(())
    }

    /// Commit the current tree to the branch and store the re-encrypted
    /// index.
    ///
    /// The commit and the index upload are separate steps: a crash between
    /// them leaves the stored index at the previous commit.
    pub async fn create_snapshot(&mut self, timestamp: DateTime<Utc>) -> RepoResult<Snapshot> {
        let parents: Vec<_> = self
            .index
            .read_latest_snapshot(&self.config.branch)
            .await?
            .map(|head| head.hash)
            .into_iter()
            .collect();
        let root = self.tree.finalize(&self.index).await?;
        let snapshot = self
            .index
            .write_snapshot(root, timestamp, &parents, &self.config.branch)
            .await?;
        self.store_index().await?;
        info!(
            repo = %self.repo_id,
            branch = %self.config.branch,
            commit = %snapshot.hash.short_hex(),
            tree = %root,
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// The head commit of this handle's branch.
    pub async fn head(&self) -> RepoResult<Option<Snapshot>> {
        Ok(self.index.read_latest_snapshot(&self.config.branch).await?)
    }

    /// Contents of the file at `path`, or `None` if there is none.
    pub async fn read_file(&mut self, path: &[String]) -> RepoResult<Option<Vec<u8>>> {
        let Some(blob) = self.tree.read_blob(&self.index, path).await? else {
            return Ok(None);
        };
        let content = blob.content.hash;
        let data = match self.index.read_blob_info(&content).await? {
            BlobInfo::Inlined { parts } => parts.concat(),
            BlobInfo::Encrypted { key, parts } => {
                let mut data = Vec::with_capacity(blob.size as usize);
                for part in parts {
                    let ciphertext = self.store.read(&blob_path(&part)).await?;
                    if sha256(&ciphertext) != part {
                        return Err(RepoError::CorruptBlob { hash: part });
                    }
                    data.extend(self.encryption.decrypt(&ciphertext, &key)?);
                }
                data
            }
        };
        if sha256(&data) != content {
            return Err(RepoError::CorruptBlob { hash: content });
        }
        Ok(Some(data))
    }

    /// Target of the repo link at `path`, or `None` if there is none.
    pub async fn read_repo_link(&mut self, path: &[String]) -> RepoResult<Option<RepoId>> {
        Ok(self
            .tree
            .read_repo_link(&self.index, path)
            .await?
            .map(|link| link.repo_id))
    }

    /// Entries of the directory at `path`, or `None` if it does not exist.
    pub async fn list_directory(&mut self, path: &[String]) -> RepoResult<Option<Vec<DirEntry>>> {
        let Some(items) = self.tree.list_dir(&self.index, path).await? else {
            return Ok(None);
        };
        let entries = items
            .into_iter()
            .map(|(name, item)| {
                let kind = match item {
                    DirItem::Blob(blob) => DirEntryKind::File {
                        size: blob.size,
                        creation_time: blob.creation_time,
                        modification_time: blob.modification_time,
                    },
                    DirItem::Tree => DirEntryKind::Directory,
                    DirItem::RepoLink(link) => DirEntryKind::RepoLink {
                        repo_id: link.repo_id,
                    },
                };
                DirEntry { name, kind }
            })
            .collect();
        Ok(Some(entries))
    }

    async fn store_index(&self) -> RepoResult<()> {
        let image = self.index.db().serialize().await?;
        let sealed = self.encryption.encrypt(&image, &self.config.key)?;
        self.store.write(&index_path(), &sealed).await?;
        debug!(repo = %self.repo_id, bytes = sealed.len(), "index stored");
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("repo_id", &self.repo_id)
            .field("branch", &self.config.branch)
            .field("inlined", &self.config.inlined)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use coffer_crypto::CryptoError;
    use coffer_index::IndexError;
    use coffer_store::{InMemoryBlobStore, StoreError};
    use coffer_tree::{tree_hash, StoredEntry, TreeError, TREE_HASH_DOMAIN};
    use proptest::prelude::*;

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn id(s: &str) -> RepoId {
        RepoId::new(s).unwrap()
    }

    async fn fresh(backend: &Backend, key: &EncryptionKey) -> Repository {
        Repository::create(id("repo"), backend, RepoConfig::new(key.clone()))
            .await
            .unwrap()
    }

    /// Number of tree entries that reference the content row of `data`.
    async fn entries_referencing(repo: &Repository, data: &[u8]) -> i64 {
        let content_id = repo
            .index()
            .read_content(&sha256(data))
            .await
            .unwrap()
            .unwrap()
            .id;
        repo.index()
            .db()
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM tree_entry WHERE content_id = ?1",
                    [content_id],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_snapshot_read_roundtrip() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let mut repo = fresh(&backend, &key).await;

        repo.insert_file(&p(&["docs", "a.txt"]), b"alpha", 1, 2).await.unwrap();
        // Readable before the snapshot too.
        assert_eq!(
            repo.read_file(&p(&["docs", "a.txt"])).await.unwrap(),
            Some(b"alpha".to_vec())
        );
        repo.create_snapshot(ts(0)).await.unwrap();
        assert_eq!(
            repo.read_file(&p(&["docs", "a.txt"])).await.unwrap(),
            Some(b"alpha".to_vec())
        );

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
            .await
            .unwrap();
        assert_eq!(
            reopened.read_file(&p(&["docs", "a.txt"])).await.unwrap(),
            Some(b"alpha".to_vec())
        );
        assert_eq!(reopened.read_file(&p(&["docs", "b.txt"])).await.unwrap(), None);
        assert_eq!(reopened.read_file(&p(&["nowhere", "b.txt"])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn identical_content_is_stored_once() {
        let shared = Arc::new(InMemoryBlobStore::new());
        let backend = Backend::with_shared_store(shared.clone());
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;

        repo.insert_file(&p(&["one"]), b"same bytes", 1, 1).await.unwrap();
        repo.insert_file(&p(&["dir", "two"]), b"same bytes", 1, 1).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();

        let stats = repo.index().stats().await.unwrap();
        assert_eq!(stats.blobs, 1);
        assert_eq!(stats.blob_parts, 1);
        assert_eq!(entries_referencing(&repo, b"same bytes").await, 2);

        let blob_parts = shared
            .all_paths()
            .into_iter()
            .filter(|path| path.get(1).map(String::as_str) == Some("blobs"))
            .count();
        assert_eq!(blob_parts, 1);
    }

    #[tokio::test]
    async fn directory_listing_is_isolated_per_level() {
        let backend = Backend::in_memory();
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        repo.insert_file(&p(&["subdir", "file1"]), b"a", 10, 20).await.unwrap();
        repo.insert_file(&p(&["subdir", "file2"]), b"b", 10, 20).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();

        let root = repo.list_directory(&[]).await.unwrap().unwrap();
        assert_eq!(
            root,
            vec![DirEntry {
                name: "subdir".into(),
                kind: DirEntryKind::Directory
            }]
        );
        let sub = repo.list_directory(&p(&["subdir"])).await.unwrap().unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(
            sub[0],
            DirEntry {
                name: "file1".into(),
                kind: DirEntryKind::File {
                    size: 1,
                    creation_time: 10,
                    modification_time: 20
                }
            }
        );
        assert_eq!(repo.list_directory(&p(&["missing"])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn later_snapshots_win_after_reopen() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let path = p(&["file"]);
        let mut repo = fresh(&backend, &key).await;

        repo.insert_file(&path, b"filedata1", 1, 1).await.unwrap();
        let first = repo.create_snapshot(ts(1)).await.unwrap();
        assert_eq!(repo.read_file(&path).await.unwrap(), Some(b"filedata1".to_vec()));
        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key.clone()))
            .await
            .unwrap();
        assert_eq!(reopened.read_file(&path).await.unwrap(), Some(b"filedata1".to_vec()));

        repo.insert_file(&path, b"filedata2", 1, 2).await.unwrap();
        let second = repo.create_snapshot(ts(2)).await.unwrap();
        assert_eq!(repo.read_file(&path).await.unwrap(), Some(b"filedata2".to_vec()));
        assert_eq!(second.parents, vec![first.hash]);

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
            .await
            .unwrap();
        assert_eq!(reopened.read_file(&path).await.unwrap(), Some(b"filedata2".to_vec()));
        assert_eq!(reopened.head().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn repo_link_survives_reopen() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let mut repo = fresh(&backend, &key).await;
        repo.insert_repo_link(&p(&["link1"]), &id("repoId")).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();
        assert_eq!(
            repo.read_repo_link(&p(&["link1"])).await.unwrap(),
            Some(id("repoId"))
        );

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
            .await
            .unwrap();
        assert_eq!(
            reopened.read_repo_link(&p(&["link1"])).await.unwrap(),
            Some(id("repoId"))
        );
        let listing = reopened.list_directory(&[]).await.unwrap().unwrap();
        assert_eq!(
            listing[0].kind,
            DirEntryKind::RepoLink {
                repo_id: id("repoId")
            }
        );
        assert!(matches!(
            reopened.read_file(&p(&["link1"])).await,
            Err(RepoError::Tree(TreeError::TypeMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn wrong_key_fails_authentication() {
        let backend = Backend::in_memory();
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        repo.create_snapshot(ts(0)).await.unwrap();
        let err = Repository::open(id("repo"), &backend, RepoConfig::new(EncryptionKey::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Crypto(CryptoError::Authentication(_))));
    }

    #[tokio::test]
    async fn create_refuses_existing_repository() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        fresh(&backend, &key).await;
        assert!(matches!(
            Repository::create(id("repo"), &backend, RepoConfig::new(key)).await,
            Err(RepoError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn open_missing_repository_is_not_found() {
        let backend = Backend::in_memory();
        let err = Repository::open(id("ghost"), &backend, RepoConfig::new(EncryptionKey::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn tampered_blob_part_is_detected() {
        let shared = Arc::new(InMemoryBlobStore::new());
        let backend = Backend::with_shared_store(shared.clone());
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        repo.insert_file(&p(&["f"]), b"secret", 1, 1).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();

        let blob = shared
            .all_paths()
            .into_iter()
            .find(|path| path.get(1).map(String::as_str) == Some("blobs"))
            .unwrap();
        shared.write(&blob, b"garbage").await.unwrap();
        assert!(matches!(
            repo.read_file(&p(&["f"])).await,
            Err(RepoError::CorruptBlob { .. })
        ));
    }

    #[tokio::test]
    async fn ciphertext_never_contains_plaintext() {
        let shared = Arc::new(InMemoryBlobStore::new());
        let backend = Backend::with_shared_store(shared.clone());
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        let secret = b"very recognisable plaintext marker";
        repo.insert_file(&p(&["secret-name.txt"]), secret, 1, 1).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();

        for path in shared.all_paths() {
            let bytes = shared.read(&path).await.unwrap();
            assert!(!bytes.windows(secret.len()).any(|w| w == secret));
            assert!(!bytes.windows(15).any(|w| w == b"secret-name.txt"));
        }
    }

    #[tokio::test]
    async fn branches_share_one_index() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let mut main = fresh(&backend, &key).await;
        main.insert_file(&p(&["main-file"]), b"m", 1, 1).await.unwrap();
        main.create_snapshot(ts(0)).await.unwrap();

        let mut side = main.branch("side", true).await.unwrap();
        assert_eq!(side.list_directory(&[]).await.unwrap(), Some(Vec::new()));
        side.insert_file(&p(&["side-file"]), b"s", 1, 1).await.unwrap();
        side.create_snapshot(ts(1)).await.unwrap();

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key.clone()))
            .await
            .unwrap();
        assert_eq!(reopened.read_file(&p(&["side-file"])).await.unwrap(), None);
        let mut side = reopened.branch("side", true).await.unwrap();
        assert_eq!(side.read_file(&p(&["side-file"])).await.unwrap(), Some(b"s".to_vec()));
        let branches = side.index().list_branches().await.unwrap();
        assert_eq!(branches.len(), 2);
    }

    #[tokio::test]
    async fn invalid_paths_and_branches_are_rejected() {
        let backend = Backend::in_memory();
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        assert!(matches!(
            repo.insert_file(&[], b"x", 1, 1).await,
            Err(RepoError::Tree(TreeError::InvalidPath { .. }))
        ));
        assert_eq!(repo.index().stats().await.unwrap().blobs, 0);

        repo.insert_file(&p(&["f"]), b"x", 1, 1).await.unwrap();
        assert!(matches!(
            repo.insert_file(&p(&["f", "g"]), b"y", 1, 1).await,
            Err(RepoError::Tree(TreeError::InvalidPath { .. }))
        ));
        assert_eq!(repo.index().read_content(&sha256(b"y")).await.unwrap(), None);
        assert!(matches!(
            repo.branch("bad branch", false).await,
            Err(RepoError::Index(IndexError::InvalidBranch { .. }))
        ));
    }

    #[tokio::test]
    async fn rejected_insert_writes_no_ciphertext() {
        let shared = Arc::new(InMemoryBlobStore::new());
        let backend = Backend::with_shared_store(shared.clone());
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        repo.insert_file(&p(&["f"]), b"x", 1, 1).await.unwrap();
        repo.create_snapshot(ts(0)).await.unwrap();

        let mut reopened = Repository::open(id("repo"), &backend, repo.config().clone())
            .await
            .unwrap();
        let writes = shared.write_count();
        assert!(matches!(
            reopened.insert_file(&p(&["f", "g"]), b"orphan", 1, 1).await,
            Err(RepoError::Tree(TreeError::InvalidPath { .. }))
        ));
        assert_eq!(shared.write_count(), writes);
        assert_eq!(reopened.index().stats().await.unwrap().blobs, 1);
        assert!(!reopened.is_dirty());
    }

    #[tokio::test]
    async fn file_equal_to_a_tree_hash_input_roundtrips() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let mut repo = fresh(&backend, &key).await;
        // The empty root tree is stored first.
        repo.create_snapshot(ts(0)).await.unwrap();

        let data = format!("v{TREE_HASH_DOMAIN}").into_bytes();
        assert_eq!(sha256(&data), tree_hash(&[]));
        repo.insert_file(&p(&["f"]), &data, 1, 1).await.unwrap();
        repo.create_snapshot(ts(1)).await.unwrap();
        assert_eq!(repo.read_file(&p(&["f"])).await.unwrap(), Some(data.clone()));

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
            .await
            .unwrap();
        assert_eq!(reopened.read_file(&p(&["f"])).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn directory_hashing_like_a_stored_file_keeps_its_entries() {
        let backend = Backend::in_memory();
        let key = EncryptionKey::generate();
        let mut repo = fresh(&backend, &key).await;

        // Hash input of the directory {g: 7-byte blob, created 1, modified 1}.
        let mut preimage = format!("v{TREE_HASH_DOMAIN}ngybh").into_bytes();
        preimage.extend_from_slice(sha256(b"g-bytes").as_bytes());
        preimage.extend_from_slice(b"s7c1m1");

        repo.insert_file(&p(&["x"]), &preimage, 1, 1).await.unwrap();
        repo.insert_file(&p(&["dir", "g"]), b"g-bytes", 1, 1).await.unwrap();
        let snapshot = repo.create_snapshot(ts(0)).await.unwrap();

        let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
            .await
            .unwrap();
        let dir = reopened.list_directory(&p(&["dir"])).await.unwrap().unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(
            reopened.read_file(&p(&["dir", "g"])).await.unwrap(),
            Some(b"g-bytes".to_vec())
        );
        assert_eq!(reopened.read_file(&p(&["x"])).await.unwrap(), Some(preimage.clone()));

        // The directory really did hash like the file.
        let dir_hash = reopened
            .index()
            .read_tree(snapshot.tree.id)
            .await
            .unwrap()
            .into_iter()
            .find_map(|(name, entry)| match entry {
                StoredEntry::Tree(tree) if name == "dir" => Some(tree.hash),
                _ => None,
            })
            .unwrap();
        assert_eq!(dir_hash, sha256(&preimage));
    }

    #[tokio::test]
    async fn untouched_snapshot_keeps_the_tree() {
        let backend = Backend::in_memory();
        let mut repo = fresh(&backend, &EncryptionKey::generate()).await;
        repo.insert_file(&p(&["f"]), b"x", 1, 1).await.unwrap();
        let first = repo.create_snapshot(ts(0)).await.unwrap();
        assert!(!repo.is_dirty());
        let second = repo.create_snapshot(ts(1)).await.unwrap();
        assert_eq!(first.tree, second.tree);
        assert_ne!(first.hash, second.hash);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_bytes_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            path in proptest::collection::vec("[a-z0-9]{1,8}", 1..4),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let read = runtime.block_on(async {
                let backend = Backend::in_memory();
                let key = EncryptionKey::generate();
                let mut repo = fresh(&backend, &key).await;
                repo.insert_file(&path, &data, 1, 1).await.unwrap();
                repo.create_snapshot(ts(0)).await.unwrap();
                let mut reopened = Repository::open(id("repo"), &backend, RepoConfig::new(key))
                    .await
                    .unwrap();
                reopened.read_file(&path).await.unwrap()
            });
            prop_assert_eq!(read, Some(data));
        }
    }
}
