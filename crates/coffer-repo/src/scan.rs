//! Snapshotting a local directory into a repository.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use coffer_index::Snapshot;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;

/// A regular file found by [`scan_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path segments relative to the scanned root.
    pub path: Vec<String>,
    /// Where to read the file from.
    pub source: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub creation_time: i64,
    pub modification_time: i64,
}

/// Every regular file under `root`, in name order.
///
/// Symlinks and special files are skipped, as are names that are not valid
/// UTF-8. Platforms without a creation time report the modification time.
/// `root` itself must be a directory.
pub fn scan_dir(root: &Path) -> RepoResult<Vec<ScannedFile>> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(RepoError::NotADirectory(root.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            warn!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }

        let Some(path) = relative_segments(root, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping file with non UTF-8 name");
            continue;
        };
        let metadata = entry.metadata().map_err(std::io::Error::from)?;
        let (creation_time, modification_time) = file_times(&metadata)?;
        files.push(ScannedFile {
            path,
            source: entry.into_path(),
            creation_time,
            modification_time,
        });
    }
    Ok(files)
}

/// Insert every file under `root` into `repo` and snapshot it.
pub async fn snapshot_dir(
    repo: &mut Repository,
    root: &Path,
    timestamp: DateTime<Utc>,
) -> RepoResult<Snapshot> {
    let scan_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || scan_dir(&scan_root))
        .await
        .map_err(std::io::Error::other)??;

    let mut bytes = 0u64;
    for file in &files {
        let data = tokio::fs::read(&file.source).await?;
        debug!(path = %file.path.join("/"), size = data.len(), "inserting file");
        bytes += data.len() as u64;
        repo.insert_file(&file.path, &data, file.creation_time, file.modification_time)
            .await?;
    }

    let snapshot = repo.create_snapshot(timestamp).await?;
    info!(
        root = %root.display(),
        files = files.len(),
        bytes,
        commit = %snapshot.hash.short_hex(),
        "directory snapshotted"
    );
    Ok(snapshot)
}

fn relative_segments(root: &Path, path: &Path) -> Option<Vec<String>> {
    path.strip_prefix(root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect()
}

fn file_times(metadata: &Metadata) -> std::io::Result<(i64, i64)> {
    let modified = metadata.modified()?;
    let created = metadata.created().unwrap_or(modified);
    Ok((millis(created.into()), millis(modified.into())))
}

fn millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::config::RepoConfig;
    use crate::repository::DirEntryKind;
    use coffer_crypto::EncryptionKey;
    use coffer_types::RepoId;

    fn p(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scan_lists_nested_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("b/inner/deep.txt"), b"deep").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"c").unwrap();

        let files = scan_dir(dir.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![p(&["a.txt"]), p(&["b", "inner", "deep.txt"]), p(&["c.txt"])]
        );
        assert!(files.iter().all(|f| f.modification_time > 0));
    }

    #[cfg(unix)]
    #[test]
    fn scan_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let files = scan_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, p(&["real"]));
    }

    #[test]
    fn scan_of_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn scan_of_a_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, b"jpeg").unwrap();
        assert!(matches!(
            scan_dir(&file),
            Err(RepoError::NotADirectory(path)) if path == file
        ));
    }

    #[tokio::test]
    async fn snapshot_dir_stores_every_file() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("photos")).unwrap();
        std::fs::write(source.path().join("photos/one.jpg"), b"jpeg bytes").unwrap();
        std::fs::write(source.path().join("notes.md"), b"# notes").unwrap();

        let backend = Backend::in_memory();
        let mut repo = Repository::create(
            RepoId::new("scan").unwrap(),
            &backend,
            RepoConfig::new(EncryptionKey::generate()),
        )
        .await
        .unwrap();
        let snapshot = snapshot_dir(&mut repo, source.path(), Utc::now()).await.unwrap();
        assert_eq!(repo.head().await.unwrap(), Some(snapshot));

        assert_eq!(
            repo.read_file(&p(&["photos", "one.jpg"])).await.unwrap(),
            Some(b"jpeg bytes".to_vec())
        );
        let root = repo.list_directory(&[]).await.unwrap().unwrap();
        assert_eq!(root.len(), 2);
        assert_eq!(root[0].name, "notes.md");
        assert!(matches!(root[0].kind, DirEntryKind::File { size: 7, .. }));
        assert_eq!(root[1].kind, DirEntryKind::Directory);
    }
}
