use std::future::Future;
use std::pin::Pin;

use coffer_types::DbHash;
use tracing::debug;

use crate::entry::{
    tree_hash, BlobEntry, DirItem, Entry, EntryKind, PersistedTree, RepoLinkEntry, StoredEntry,
    Tree,
};
use crate::error::{display_path, TreeError, TreeResult};
use crate::traits::{TreeLoader, TreeWriter};

type FinalizeFuture<'a, E> = Pin<Box<dyn Future<Output = Result<DbHash, E>> + Send + 'a>>;

/// In-memory overlay of one branch's tree.
///
/// The root is always a tree entry: persisted when nothing has changed since
/// the last `finalize`, mutated otherwise.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    root: Entry,
}

impl TreeBuilder {
    /// A builder for a branch with no commits yet.
    pub fn empty() -> Self {
        Self {
            root: Entry::Mutated(Tree::new()),
        }
    }

    /// A builder seeded from a persisted root tree. Nothing is loaded until
    /// a path walks into it.
    pub fn from_root(root: DbHash) -> Self {
        Self {
            root: Entry::Tree(PersistedTree::unloaded(root)),
        }
    }

    /// Whether anything changed since the last finalize.
    pub fn is_dirty(&self) -> bool {
        self.root.is_dirty()
    }

    /// Walk to the directory at `path`, creating missing directories and
    /// marking every directory on the way dirty.
    pub async fn load_tree<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<&mut Tree, L::Error> {
        let mut node = &mut self.root;
        for (depth, segment) in path.iter().enumerate() {
            if segment.is_empty() {
                return Err(TreeError::invalid_path(&path[..=depth], "empty name").into());
            }
            let tree = make_mutated(node, loader, &path[..depth]).await?;
            node = tree
                .entries
                .entry(segment.clone())
                .or_insert_with(|| Entry::Mutated(Tree::new()));
        }
        make_mutated(node, loader, path).await
    }

    /// Set the entry at `path`, replacing whatever had that name.
    pub async fn insert_entry<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
        entry: Entry,
    ) -> Result<(), L::Error> {
        let (name, parent) = split_leaf(path)?;
        let dir = self.load_tree(loader, parent).await?;
        dir.entries.insert(name.to_string(), entry);
        Ok(())
    }

    pub async fn insert_blob<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
        blob: BlobEntry,
    ) -> Result<(), L::Error> {
        self.insert_entry(loader, path, Entry::Blob(blob)).await
    }

    pub async fn insert_repo_link<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
        link: RepoLinkEntry,
    ) -> Result<(), L::Error> {
        self.insert_entry(loader, path, Entry::RepoLink(link)).await
    }

    /// Fail if an existing ancestor of `path` is not a directory, so an
    /// insert at `path` would be rejected. Loads subtrees like a read and
    /// marks nothing dirty.
    pub async fn check_insert_path<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<(), L::Error> {
        let (_, parent) = split_leaf(path)?;
        self.walk(loader, parent).await.map(|_| ())
    }

    /// The file at `path`, or `None` if nothing has that name.
    pub async fn read_blob<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<Option<BlobEntry>, L::Error> {
        match self.read_leaf(loader, path, EntryKind::Blob).await? {
            Some(Entry::Blob(blob)) => Ok(Some(blob.clone())),
            _ => Ok(None),
        }
    }

    /// The repo link at `path`, or `None` if nothing has that name.
    pub async fn read_repo_link<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<Option<RepoLinkEntry>, L::Error> {
        match self.read_leaf(loader, path, EntryKind::RepoLink).await? {
            Some(Entry::RepoLink(link)) => Ok(Some(link.clone())),
            _ => Ok(None),
        }
    }

    /// Entries of the directory at `path`, sorted by name, or `None` if it
    /// does not exist. Reading does not mark anything dirty.
    pub async fn list_dir<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<Option<Vec<(String, DirItem)>>, L::Error> {
        let Some(dir) = self.walk(loader, path).await? else {
            return Ok(None);
        };
        let items = dir
            .entries
            .iter()
            .map(|(name, entry)| {
                let item = match entry {
                    Entry::Blob(blob) => DirItem::Blob(blob.clone()),
                    Entry::RepoLink(link) => DirItem::RepoLink(link.clone()),
                    Entry::Tree(_) | Entry::Mutated(_) => DirItem::Tree,
                };
                (name.clone(), item)
            })
            .collect();
        Ok(Some(items))
    }

    /// Hash and persist every dirty directory, children first, and return
    /// the root. Untouched subtrees are referenced by their existing hash.
    pub async fn finalize<W: TreeWriter>(&mut self, writer: &W) -> Result<DbHash, W::Error> {
        let root = match &mut self.root {
            Entry::Tree(persisted) => return Ok(persisted.hash),
            Entry::Mutated(tree) => tree,
            Entry::Blob(_) | Entry::RepoLink(_) => {
                return Err(TreeError::invalid_path(&[], "root is not a directory").into())
            }
        };
        let hash = finalize_tree(root, writer).await?;
        let data = std::mem::take(root);
        self.root = Entry::Tree(PersistedTree {
            hash,
            data: Some(data),
        });
        Ok(hash)
    }

    async fn read_leaf<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
        expected: EntryKind,
    ) -> Result<Option<&Entry>, L::Error> {
        let (name, parent) = split_leaf(path)?;
        let Some(dir) = self.walk(loader, parent).await? else {
            return Ok(None);
        };
        match dir.entries.get(name) {
            None => Ok(None),
            Some(entry) if entry.kind() == expected => Ok(Some(entry)),
            Some(entry) => Err(TreeError::TypeMismatch {
                path: display_path(path),
                expected,
                found: entry.kind(),
            }
            .into()),
        }
    }

    /// Read-only walk. Persisted subtrees are loaded and cached in place but
    /// stay persisted.
    async fn walk<L: TreeLoader>(
        &mut self,
        loader: &L,
        path: &[String],
    ) -> Result<Option<&mut Tree>, L::Error> {
        let mut node = &mut self.root;
        for (depth, segment) in path.iter().enumerate() {
            let kind = node.kind();
            let Some(tree) = cached_tree(node, loader).await? else {
                return Err(not_a_directory(&path[..depth], kind).into());
            };
            node = match tree.entries.get_mut(segment) {
                Some(child) => child,
                None => return Ok(None),
            };
        }
        let kind = node.kind();
        match cached_tree(node, loader).await? {
            Some(tree) => Ok(Some(tree)),
            None => Err(not_a_directory(path, kind).into()),
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::empty()
    }
}

/// Check that `path` can name a leaf: non-empty, with no empty segment.
pub fn validate_leaf_path(path: &[String]) -> TreeResult<()> {
    if let Some(depth) = path.iter().position(String::is_empty) {
        return Err(TreeError::invalid_path(&path[..=depth], "empty name"));
    }
    split_leaf(path).map(|_| ())
}

fn split_leaf(path: &[String]) -> Result<(&str, &[String]), TreeError> {
    match path.split_last() {
        None => Err(TreeError::invalid_path(path, "empty path")),
        Some((name, _)) if name.is_empty() => Err(TreeError::invalid_path(path, "empty name")),
        Some((name, parent)) => Ok((name.as_str(), parent)),
    }
}

fn not_a_directory(path: &[String], kind: EntryKind) -> TreeError {
    TreeError::invalid_path(path, format!("is a {kind}, not a directory"))
}

async fn load<L: TreeLoader>(loader: &L, hash: DbHash) -> Result<Tree, L::Error> {
    let stored = loader.read_tree(hash.id).await?;
    debug!(tree = %hash, entries = stored.len(), "tree loaded");
    Ok(Tree {
        entries: stored
            .into_iter()
            .map(|(name, entry)| (name, Entry::from(entry)))
            .collect(),
    })
}

/// Turn `entry` into a dirty directory, loading it first if needed.
async fn make_mutated<'a, L: TreeLoader>(
    entry: &'a mut Entry,
    loader: &L,
    path: &[String],
) -> Result<&'a mut Tree, L::Error> {
    if let Entry::Tree(persisted) = entry {
        let tree = match persisted.data.take() {
            Some(tree) => tree,
            None => load(loader, persisted.hash).await?,
        };
        *entry = Entry::Mutated(tree);
    }
    match entry {
        Entry::Mutated(tree) => Ok(tree),
        other => Err(not_a_directory(path, other.kind()).into()),
    }
}

/// The directory behind `entry` without changing its state, or `None` if it
/// is not a directory.
async fn cached_tree<'a, L: TreeLoader>(
    entry: &'a mut Entry,
    loader: &L,
) -> Result<Option<&'a mut Tree>, L::Error> {
    match entry {
        Entry::Mutated(tree) => Ok(Some(tree)),
        Entry::Tree(persisted) => {
            let tree = match persisted.data.take() {
                Some(tree) => tree,
                None => load(loader, persisted.hash).await?,
            };
            Ok(Some(persisted.data.insert(tree)))
        }
        Entry::Blob(_) | Entry::RepoLink(_) => Ok(None),
    }
}

fn finalize_tree<'a, W: TreeWriter>(tree: &'a mut Tree, writer: &'a W) -> FinalizeFuture<'a, W::Error> {
    Box::pin(async move {
        let mut stored = Vec::with_capacity(tree.entries.len());
        for (name, child) in tree.entries.iter_mut() {
            let entry = match child {
                Entry::Blob(blob) => StoredEntry::Blob(blob.clone()),
                Entry::RepoLink(link) => StoredEntry::RepoLink(link.clone()),
                Entry::Tree(persisted) => StoredEntry::Tree(persisted.hash),
                Entry::Mutated(subtree) => {
                    let hash = finalize_tree(subtree, writer).await?;
                    let data = std::mem::take(subtree);
                    *child = Entry::Tree(PersistedTree {
                        hash,
                        data: Some(data),
                    });
                    StoredEntry::Tree(hash)
                }
            };
            stored.push((name.clone(), entry));
        }

        let hash = tree_hash(&stored);
        if let Some(existing) = writer.find_tree(&hash).await? {
            debug!(tree = %existing, "tree already stored");
            return Ok(existing);
        }
        let written = writer.write_tree(&hash, &stored).await?;
        debug!(tree = %written, entries = stored.len(), "tree written");
        Ok(written)
    })
}
