//! Index schema migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table, so
//! running them against a current index is a no-op. Each migration runs in
//! its own transaction.
//!
//! The schema keeps room for blobs split into several parts and commits
//! with several parents, although writers currently produce one part per
//! blob and at most one parent per commit.

use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

use crate::error::{IndexError, IndexResult};

/// Current schema version.
pub const CURRENT_VERSION: i64 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &mut Connection) -> IndexResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = schema_version(conn)?;
    if current_version > CURRENT_VERSION {
        return Err(IndexError::Migration(format!(
            "index schema version {current_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }
    if current_version == CURRENT_VERSION {
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "running index migrations");

    if current_version < 1 {
        apply(conn, 1, "initial_schema", migrate_v1_initial_schema)?;
    }
    if current_version < 2 {
        apply(conn, 2, "lookup_indexes", migrate_v2_lookup_indexes)?;
    }

    info!("index migrations complete");
    Ok(())
}

/// Highest applied migration, 0 for an empty database.
pub fn schema_version(conn: &Connection) -> IndexResult<i64> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(
    conn: &mut Connection,
    version: i64,
    name: &str,
    migration: fn(&Transaction<'_>) -> rusqlite::Result<()>,
) -> IndexResult<()> {
    let tx = conn.transaction()?;
    migration(&tx).map_err(|e| IndexError::Migration(format!("v{version} {name}: {e}")))?;
    tx.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        params![version, name],
    )?;
    tx.commit()?;
    debug!(version, name, "migration applied");
    Ok(())
}

/// V1: contents, blobs, tree entries, commits and branches.
fn migrate_v1_initial_schema(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        -- Plaintext blob hashes and tree hashes share one table. A row is a
        -- blob if a `blob` row references it, a tree otherwise; equal hashes
        -- of different kinds get separate rows.
        CREATE TABLE content (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            hash265 BLOB NOT NULL
        );
        CREATE INDEX content_hash265_index ON content (hash265);

        -- type: b (blob), t (tree) or r (repo link). Repo links have no
        -- content_id; their target repository id is in `link`.
        CREATE TABLE tree_entry (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            tree_id INTEGER NOT NULL REFERENCES content (id),
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            content_id INTEGER REFERENCES content (id),
            size INTEGER,
            creation_time INTEGER,
            modification_time INTEGER,
            link TEXT
        );

        -- enc_key is NULL for inlined blobs.
        CREATE TABLE blob (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            content_id INTEGER NOT NULL REFERENCES content (id),
            enc_key BLOB
        );

        -- Encrypted parts carry the ciphertext hash in `key`; inlined parts
        -- carry the plaintext in `data`.
        CREATE TABLE blob_part (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            blob_id INTEGER NOT NULL REFERENCES blob (id),
            "index" INTEGER NOT NULL,
            "key" BLOB,
            data BLOB
        );

        -- timestamp: ms since epoch; parents: JSON array of hex hashes.
        CREATE TABLE "commit" (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            hash256 BLOB NOT NULL,
            tree_content_id INTEGER NOT NULL REFERENCES content (id),
            timestamp INTEGER NOT NULL,
            parents TEXT NOT NULL
        );

        CREATE TABLE branch (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            name TEXT NOT NULL UNIQUE,
            commit_id INTEGER NOT NULL REFERENCES "commit" (id)
        );
        "#,
    )
}

/// V2: lookup indexes for tree loading and blob reads.
fn migrate_v2_lookup_indexes(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        r#"
        CREATE INDEX tree_entry_tree_id_index ON tree_entry (tree_id);
        CREATE INDEX blob_content_id_index ON blob (content_id);
        CREATE UNIQUE INDEX blob_part_blob_id_index ON blob_part (blob_id, "index");
        "#,
    )
}
