//! Typed read/write façade over the index tables.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use coffer_crypto::{hash_parts, EncryptionKey, HashPart};
use coffer_tree::{
    BlobEntry, EntryKind, RepoLinkEntry, StoredEntry, TreeLoader, TreeWriter,
};
use coffer_types::{ContentHash, DbHash, RepoId};
use rusqlite::params;
use tracing::debug;

use crate::branch::validate_branch_name;
use crate::db::IndexDb;
use crate::error::{IndexError, IndexResult};
use crate::models::{BlobInfo, Branch, IndexStats, Snapshot};

/// Raw `tree_entry` row joined with the referenced content hash.
struct TreeEntryRow {
    name: String,
    kind: String,
    content_id: Option<i64>,
    hash: Option<Vec<u8>>,
    size: Option<i64>,
    creation_time: Option<i64>,
    modification_time: Option<i64>,
    link: Option<String>,
}

/// Raw `commit` row joined with its tree hash.
struct SnapshotRow {
    hash: Vec<u8>,
    tree_id: i64,
    tree_hash: Vec<u8>,
    timestamp: i64,
    parents: String,
}

/// `(key, data)` columns of one `blob_part` row.
type PartRow = (Option<Vec<u8>>, Option<Vec<u8>>);

/// Hash of a commit: the root tree hash, the timestamp and every parent
/// hash in order.
pub fn commit_hash(tree: &ContentHash, timestamp: DateTime<Utc>, parents: &[ContentHash]) -> ContentHash {
    let mut parts = vec![
        HashPart::bytes("t", tree.as_bytes()),
        HashPart::timestamp("ts", timestamp),
    ];
    parts.extend(parents.iter().map(|p| HashPart::bytes("p", p.as_bytes())));
    hash_parts(&parts)
}

/// Persistence façade over one index database.
///
/// Every write returns the [`DbHash`] of the row it created so callers can
/// reference it without another lookup.
#[derive(Debug, Clone)]
pub struct IndexRepository {
    db: IndexDb,
}

impl IndexRepository {
    pub fn new(db: IndexDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &IndexDb {
        &self.db
    }

    /// Dedup probe: the blob content row for `hash`, if a blob with this
    /// plaintext hash was ever stored. Tree rows with the same hash are
    /// ignored.
    pub async fn read_content(&self, hash: &ContentHash) -> IndexResult<Option<DbHash>> {
        self.find_content(
            hash,
            "SELECT c.id FROM content c
             JOIN blob b ON b.content_id = c.id
             WHERE c.hash265 = ?1 ORDER BY c.id LIMIT 1",
        )
        .await
    }

    /// The tree content row for `hash`: a row with this hash and no blob
    /// behind it.
    pub async fn read_tree_content(&self, hash: &ContentHash) -> IndexResult<Option<DbHash>> {
        self.find_content(
            hash,
            "SELECT c.id FROM content c
             WHERE c.hash265 = ?1
               AND NOT EXISTS (SELECT 1 FROM blob b WHERE b.content_id = c.id)
             ORDER BY c.id LIMIT 1",
        )
        .await
    }

    async fn find_content(&self, hash: &ContentHash, sql: &'static str) -> IndexResult<Option<DbHash>> {
        let hash = *hash;
        let key = hash.as_bytes().to_vec();
        let id = self
            .db
            .call(move |conn| {
                let result = conn.query_row(sql, params![key], |row| row.get::<_, i64>(0));
                match result {
                    Ok(id) => Ok(Some(id)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(id.map(|id| DbHash::new(id, hash)))
    }

    /// Insert a content row and its blob info in one transaction.
    ///
    /// The caller must have checked with [`Self::read_content`] that the
    /// hash is not stored yet.
    pub async fn write_blob_info(&self, hash: &ContentHash, info: &BlobInfo) -> IndexResult<DbHash> {
        let key = hash.as_bytes().to_vec();
        let (enc_key, parts): (Option<Vec<u8>>, Vec<PartRow>) = match info {
            BlobInfo::Inlined { parts } => (
                None,
                parts.iter().map(|data| (None, Some(data.clone()))).collect(),
            ),
            BlobInfo::Encrypted { key, parts } => (
                Some(key.as_bytes().to_vec()),
                parts
                    .iter()
                    .map(|part| (Some(part.as_bytes().to_vec()), None))
                    .collect(),
            ),
        };
        let part_count = parts.len();

        let content_id = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("INSERT INTO content (hash265) VALUES (?1)", params![key])?;
                let content_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO blob (content_id, enc_key) VALUES (?1, ?2)",
                    params![content_id, enc_key],
                )?;
                let blob_id = tx.last_insert_rowid();
                {
                    let mut stmt = tx.prepare_cached(
                        r#"INSERT INTO blob_part (blob_id, "index", "key", data) VALUES (?1, ?2, ?3, ?4)"#,
                    )?;
                    for (index, (part_key, data)) in parts.iter().enumerate() {
                        stmt.execute(params![blob_id, index as i64, part_key, data])?;
                    }
                }
                tx.commit()?;
                Ok(content_id)
            })
            .await?;

        debug!(hash = %hash.short_hex(), content_id, parts = part_count, "blob info written");
        Ok(DbHash::new(content_id, *hash))
    }

    /// Blob info for a plaintext hash, parts in stored order.
    pub async fn read_blob_info(&self, hash: &ContentHash) -> IndexResult<BlobInfo> {
        let key = hash.as_bytes().to_vec();
        let row = self
            .db
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT b.id, b.enc_key FROM blob b
                     JOIN content c ON c.id = b.content_id
                     WHERE c.hash265 = ?1 ORDER BY b.id LIMIT 1",
                    params![key],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?)),
                );
                let (blob_id, enc_key) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let mut stmt = conn.prepare_cached(
                    r#"SELECT "key", data FROM blob_part WHERE blob_id = ?1 ORDER BY "index""#,
                )?;
                let parts = stmt
                    .query_map(params![blob_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<PartRow>, _>>()?;
                Ok(Some((enc_key, parts)))
            })
            .await?;

        let Some((enc_key, parts)) = row else {
            return Err(IndexError::NotFound {
                what: format!("blob {hash}"),
            });
        };
        if parts.is_empty() {
            return Err(IndexError::corruption(format!("blob {hash} has no parts")));
        }

        match enc_key {
            Some(enc_key) => {
                let key = EncryptionKey::from_slice(&enc_key)
                    .map_err(|e| IndexError::corruption(format!("blob {hash} key: {e}")))?;
                let parts = parts
                    .into_iter()
                    .map(|(part_key, _)| {
                        let part_key = part_key.ok_or_else(|| {
                            IndexError::corruption(format!("encrypted blob {hash} part without key"))
                        })?;
                        hash_column(&part_key, "blob part key")
                    })
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(BlobInfo::Encrypted { key, parts })
            }
            None => {
                let parts = parts
                    .into_iter()
                    .map(|(_, data)| {
                        data.ok_or_else(|| {
                            IndexError::corruption(format!("inlined blob {hash} part without data"))
                        })
                    })
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(BlobInfo::Inlined { parts })
            }
        }
    }

    /// Entries of one tree level, sorted by name.
    pub async fn read_tree(&self, tree_id: i64) -> IndexResult<Vec<(String, StoredEntry)>> {
        let rows = self
            .db
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM content WHERE id = ?1)",
                    params![tree_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(IndexError::corruption(format!("dangling tree id {tree_id}")));
                }
                let mut stmt = conn.prepare_cached(
                    "SELECT e.name, e.type, e.content_id, c.hash265, e.size,
                            e.creation_time, e.modification_time, e.link
                     FROM tree_entry e
                     LEFT JOIN content c ON c.id = e.content_id
                     WHERE e.tree_id = ?1
                     ORDER BY e.name",
                )?;
                let rows = stmt
                    .query_map(params![tree_id], |row| {
                        Ok(TreeEntryRow {
                            name: row.get(0)?,
                            kind: row.get(1)?,
                            content_id: row.get(2)?,
                            hash: row.get(3)?,
                            size: row.get(4)?,
                            creation_time: row.get(5)?,
                            modification_time: row.get(6)?,
                            link: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|row| stored_entry(tree_id, row))
            .collect()
    }

    /// Insert a tree level: one content row plus one entry row per child.
    pub async fn write_tree(
        &self,
        hash: &ContentHash,
        entries: &[(String, StoredEntry)],
    ) -> IndexResult<DbHash> {
        let key = hash.as_bytes().to_vec();
        let rows = entries
            .iter()
            .map(|(name, entry)| entry_params(name, entry))
            .collect::<IndexResult<Vec<_>>>()?;
        let entry_count = rows.len();

        let tree_id = self
            .db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("INSERT INTO content (hash265) VALUES (?1)", params![key])?;
                let tree_id = tx.last_insert_rowid();
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO tree_entry
                            (tree_id, name, type, content_id, size, creation_time, modification_time, link)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )?;
                    for row in &rows {
                        stmt.execute(params![
                            tree_id,
                            row.name,
                            row.kind,
                            row.content_id,
                            row.size,
                            row.creation_time,
                            row.modification_time,
                            row.link,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(tree_id)
            })
            .await?;

        debug!(hash = %hash.short_hex(), tree_id, entries = entry_count, "tree row written");
        Ok(DbHash::new(tree_id, *hash))
    }

    /// The head commit of `branch`, or `None` if it was never committed.
    pub async fn read_latest_snapshot(&self, branch: &str) -> IndexResult<Option<Snapshot>> {
        let name = branch.to_string();
        let row = self
            .db
            .call(move |conn| {
                let result = conn.query_row(
                    r#"SELECT c.hash256, c.tree_content_id, t.hash265, c.timestamp, c.parents
                       FROM branch b
                       JOIN "commit" c ON c.id = b.commit_id
                       JOIN content t ON t.id = c.tree_content_id
                       WHERE b.name = ?1"#,
                    params![name],
                    |row| {
                        Ok(SnapshotRow {
                            hash: row.get(0)?,
                            tree_id: row.get(1)?,
                            tree_hash: row.get(2)?,
                            timestamp: row.get(3)?,
                            parents: row.get(4)?,
                        })
                    },
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        row.map(snapshot_from_row).transpose()
    }

    /// Record a commit and point `branch` at it.
    ///
    /// The commit row and the branch upsert share one transaction. Two
    /// writers committing the same branch from separate copies of the index
    /// are not detected; the last one to store its index wins.
    pub async fn write_snapshot(
        &self,
        tree: DbHash,
        timestamp: DateTime<Utc>,
        parents: &[ContentHash],
        branch: &str,
    ) -> IndexResult<Snapshot> {
        validate_branch_name(branch)?;
        let millis = timestamp.timestamp_millis();
        let timestamp = millis_to_datetime(millis)?;
        let hash = commit_hash(&tree.hash, timestamp, parents);
        let parents_json =
            serde_json::to_string(&parents.iter().map(ContentHash::to_hex).collect::<Vec<_>>())?;

        let hash_bytes = hash.as_bytes().to_vec();
        let name = branch.to_string();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    r#"INSERT INTO "commit" (hash256, tree_content_id, timestamp, parents)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![hash_bytes, tree.id, millis, parents_json],
                )?;
                let commit_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO branch (name, commit_id) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET commit_id = excluded.commit_id",
                    params![name, commit_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(branch, commit = %hash.short_hex(), tree = %tree, "snapshot written");
        Ok(Snapshot {
            hash,
            tree,
            timestamp,
            parents: parents.to_vec(),
        })
    }

    /// Every branch with its head commit, sorted by name.
    pub async fn list_branches(&self) -> IndexResult<Vec<Branch>> {
        let rows = self
            .db
            .call(|conn| {
                let mut stmt = conn.prepare_cached(
                    r#"SELECT b.name, c.hash256 FROM branch b
                       JOIN "commit" c ON c.id = b.commit_id
                       ORDER BY b.name"#,
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(name, commit)| {
                Ok(Branch {
                    commit: hash_column(&commit, "commit hash")?,
                    name,
                })
            })
            .collect()
    }

    /// Row counts per table.
    pub async fn stats(&self) -> IndexResult<IndexStats> {
        self.db
            .call(|conn| {
                let count = |table: &str| -> rusqlite::Result<u64> {
                    let n: i64 =
                        conn.query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |row| {
                            row.get(0)
                        })?;
                    Ok(n as u64)
                };
                Ok(IndexStats {
                    contents: count("content")?,
                    blobs: count("blob")?,
                    blob_parts: count("blob_part")?,
                    tree_entries: count("tree_entry")?,
                    commits: count("commit")?,
                    branches: count("branch")?,
                })
            })
            .await
    }
}

#[async_trait]
impl TreeLoader for IndexRepository {
    type Error = IndexError;

    async fn read_tree(&self, tree_id: i64) -> IndexResult<Vec<(String, StoredEntry)>> {
        IndexRepository::read_tree(self, tree_id).await
    }
}

#[async_trait]
impl TreeWriter for IndexRepository {
    type Error = IndexError;

    async fn find_tree(&self, hash: &ContentHash) -> IndexResult<Option<DbHash>> {
        self.read_tree_content(hash).await
    }

    async fn write_tree(
        &self,
        hash: &ContentHash,
        entries: &[(String, StoredEntry)],
    ) -> IndexResult<DbHash> {
        IndexRepository::write_tree(self, hash, entries).await
    }
}

/// Column values for one `tree_entry` insert.
struct EntryParams {
    name: String,
    kind: &'static str,
    content_id: Option<i64>,
    size: Option<i64>,
    creation_time: Option<i64>,
    modification_time: Option<i64>,
    link: Option<String>,
}

fn entry_params(name: &str, entry: &StoredEntry) -> IndexResult<EntryParams> {
    let mut row = EntryParams {
        name: name.to_string(),
        kind: entry.kind().tag(),
        content_id: None,
        size: None,
        creation_time: None,
        modification_time: None,
        link: None,
    };
    match entry {
        StoredEntry::Blob(blob) => {
            row.content_id = Some(blob.content.id);
            row.size = Some(i64::try_from(blob.size).map_err(|_| {
                IndexError::corruption(format!("size of {name} does not fit the index"))
            })?);
            row.creation_time = Some(blob.creation_time);
            row.modification_time = Some(blob.modification_time);
        }
        StoredEntry::Tree(tree) => row.content_id = Some(tree.id),
        StoredEntry::RepoLink(link) => row.link = Some(link.repo_id.to_string()),
    }
    Ok(row)
}

fn stored_entry(tree_id: i64, row: TreeEntryRow) -> IndexResult<(String, StoredEntry)> {
    let missing =
        |column: &str| IndexError::corruption(format!("tree {tree_id} entry {:?}: missing {column}", row.name));

    let kind = EntryKind::from_tag(&row.kind).ok_or_else(|| {
        IndexError::corruption(format!(
            "tree {tree_id} entry {:?}: unknown type {:?}",
            row.name, row.kind
        ))
    })?;
    let entry = match kind {
        EntryKind::Blob => {
            let content = content_ref(&row, tree_id)?;
            let size = row.size.ok_or_else(|| missing("size"))?;
            StoredEntry::Blob(BlobEntry {
                content,
                size: u64::try_from(size).map_err(|_| missing("non-negative size"))?,
                creation_time: row.creation_time.ok_or_else(|| missing("creation_time"))?,
                modification_time: row
                    .modification_time
                    .ok_or_else(|| missing("modification_time"))?,
            })
        }
        EntryKind::Tree => StoredEntry::Tree(content_ref(&row, tree_id)?),
        EntryKind::RepoLink => {
            let link = row.link.clone().ok_or_else(|| missing("link"))?;
            let repo_id = RepoId::new(link).map_err(|e| {
                IndexError::corruption(format!("tree {tree_id} entry {:?}: {e}", row.name))
            })?;
            StoredEntry::RepoLink(RepoLinkEntry { repo_id })
        }
    };
    Ok((row.name, entry))
}

fn content_ref(row: &TreeEntryRow, tree_id: i64) -> IndexResult<DbHash> {
    match (row.content_id, &row.hash) {
        (Some(id), Some(hash)) => Ok(DbHash::new(id, hash_column(hash, "content hash")?)),
        _ => Err(IndexError::corruption(format!(
            "tree {tree_id} entry {:?}: dangling content reference",
            row.name
        ))),
    }
}

fn snapshot_from_row(row: SnapshotRow) -> IndexResult<Snapshot> {
    let hex: Vec<String> = serde_json::from_str(&row.parents)
        .map_err(|e| IndexError::corruption(format!("malformed parent list: {e}")))?;
    let parents = hex
        .iter()
        .map(|h| {
            ContentHash::from_hex(h)
                .map_err(|e| IndexError::corruption(format!("malformed parent hash: {e}")))
        })
        .collect::<IndexResult<Vec<_>>>()?;
    Ok(Snapshot {
        hash: hash_column(&row.hash, "commit hash")?,
        tree: DbHash::new(row.tree_id, hash_column(&row.tree_hash, "tree hash")?),
        timestamp: millis_to_datetime(row.timestamp)?,
        parents,
    })
}

fn hash_column(bytes: &[u8], what: &str) -> IndexResult<ContentHash> {
    ContentHash::from_slice(bytes).map_err(|e| IndexError::corruption(format!("{what}: {e}")))
}

fn millis_to_datetime(millis: i64) -> IndexResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| IndexError::corruption(format!("timestamp {millis} out of range")))
}
