//! Local Store
//!
//! Owns one node's on-disk layout: `<node root>/<user id>` for primary data
//! and `<node root>/<user id>_backup` for data mirrored on behalf of a peer.
//! Every operation resolves its path through the [`Sandbox`] first.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{hasher, FileLocks, Role, Sandbox, UserId};
use crate::error::{Error, Result};

/// Suffix of in-flight temporary files; never listed or inventoried
pub const TEMP_SUFFIX: &str = ".wstmp";

/// Directory listing split into subdirectories and files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Size and modification time of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Sandboxed file store for one node
#[derive(Debug, Clone)]
pub struct LocalStore {
    sandbox: Sandbox,
    locks: FileLocks,
}

impl LocalStore {
    /// Open (creating if needed) the store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let sandbox = Sandbox::new(root)?;
        std::fs::create_dir_all(sandbox.root())?;

        Ok(Self {
            sandbox,
            locks: FileLocks::new(),
        })
    }

    /// The sandbox all paths go through
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Node root directory
    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    /// List subdirectories and files of a directory in a user's partition
    pub async fn list(&self, user_id: UserId, role: Role, dir_path: &str) -> Result<Listing> {
        let dir = self.sandbox.resolve(user_id, role, dir_path)?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| not_found_or(e, user_id, dir_path))?;

        let mut listing = Listing::default();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_temp_name(&name) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                listing.dirs.push(name);
            } else {
                listing.files.push(name);
            }
        }

        listing.dirs.sort();
        listing.files.sort();
        Ok(listing)
    }

    /// Read a whole file
    pub async fn read(&self, user_id: UserId, role: Role, file_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve_file(user_id, role, file_path)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_or(e, user_id, file_path))
    }

    /// Write a file atomically, creating parent directories as needed.
    ///
    /// Content goes to a temporary sibling that is synced and then renamed
    /// over the final name, under the per-file lock. The write runs on its own
    /// task, so a caller that stops waiting never leaves a half-written file.
    pub async fn write(&self, user_id: UserId, role: Role, file_path: &str, data: Vec<u8>) -> Result<()> {
        let path = self.resolve_file(user_id, role, file_path)?;
        // Such a file would be hidden from listings and the inventory
        let reserved = path
            .file_name()
            .map(|name| is_temp_name(&name.to_string_lossy()))
            .unwrap_or(false);
        if reserved {
            return Err(Error::InvalidPath {
                user_id,
                path: file_path.to_string(),
            });
        }
        let locks = self.locks.clone();
        let len = data.len();

        let task = tokio::spawn(async move {
            let _guard = locks.lock(&path).await;
            write_replace(&path, &data).await
        });

        task.await
            .map_err(|e| Error::Internal(format!("write task failed: {}", e)))??;

        debug!(user_id, %role, path = file_path, bytes = len, "Stored file");
        Ok(())
    }

    /// Remove a file; fails with [`Error::NotFound`] if it is absent
    pub async fn delete(&self, user_id: UserId, role: Role, file_path: &str) -> Result<()> {
        let path = self.resolve_file(user_id, role, file_path)?;
        let locks = self.locks.clone();

        let task = tokio::spawn(async move {
            let _guard = locks.lock(&path).await;
            tokio::fs::remove_file(&path).await
        });

        task.await
            .map_err(|e| Error::Internal(format!("delete task failed: {}", e)))?
            .map_err(|e| not_found_or(e, user_id, file_path))?;

        debug!(user_id, %role, path = file_path, "Deleted file");
        Ok(())
    }

    /// SHA-256 digest of a stored file
    pub async fn digest_of(&self, user_id: UserId, role: Role, file_path: &str) -> Result<String> {
        let path = self.resolve_file(user_id, role, file_path)?;
        hasher::digest_file(&path).await.map_err(|e| match e {
            Error::Io(io) => not_found_or(io, user_id, file_path),
            other => other,
        })
    }

    /// Size and modification time of a stored file
    pub async fn stat(&self, user_id: UserId, role: Role, file_path: &str) -> Result<FileMeta> {
        let path = self.resolve_file(user_id, role, file_path)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_or(e, user_id, file_path))?;
        file_meta(&metadata)
    }

    /// Every regular file under the node root, temporaries excluded
    pub async fn files(&self) -> Result<Vec<PathBuf>> {
        let mut pending = vec![self.root().to_path_buf()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() && !is_temp_name(&entry.file_name().to_string_lossy()) {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn resolve_file(&self, user_id: UserId, role: Role, file_path: &str) -> Result<PathBuf> {
        self.sandbox.resolve_file(user_id, role, file_path)
    }
}

/// Convert filesystem metadata into a [`FileMeta`]
pub fn file_meta(metadata: &std::fs::Metadata) -> Result<FileMeta> {
    Ok(FileMeta {
        size: metadata.len(),
        modified: DateTime::<Utc>::from(metadata.modified()?),
    })
}

/// Name of the temporary sibling used while replacing `file_name`
fn temp_name(file_name: &str) -> String {
    format!(".{}.{}{}", file_name, uuid::Uuid::new_v4(), TEMP_SUFFIX)
}

/// Whether `name` has the exact shape produced by [`temp_name`]
fn is_temp_name(name: &str) -> bool {
    name.strip_suffix(TEMP_SUFFIX)
        .and_then(|stem| stem.rsplit_once('.'))
        .map(|(prefix, id)| prefix.len() > 1 && prefix.starts_with('.') && uuid::Uuid::parse_str(id).is_ok())
        .unwrap_or(false)
}

fn not_found_or(e: std::io::Error, user_id: UserId, path: &str) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("user {} path {}", user_id, path))
    } else {
        Error::Io(e)
    }
}

async fn write_replace(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal(format!("no parent directory for {:?}", path)))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(temp_name(&file_name));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "a/b.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.read(7, Role::Primary, "a/b.txt").await.unwrap(), b"hello");

        // Overwrite replaces silently
        store.write(7, Role::Primary, "a/b.txt", b"world".to_vec()).await.unwrap();
        assert_eq!(store.read(7, Role::Primary, "a/b.txt").await.unwrap(), b"world");

        // Roles are separate partitions
        assert!(store.read(7, Role::Backup, "a/b.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_skips_temporaries() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "docs/one.txt", b"1".to_vec()).await.unwrap();
        store.write(7, Role::Primary, "two.txt", b"2".to_vec()).await.unwrap();
        let user_root = store.sandbox().user_root(7, Role::Primary);
        std::fs::write(user_root.join(temp_name("two.txt")), b"partial").unwrap();

        let listing = store.list(7, Role::Primary, "").await.unwrap();
        assert_eq!(listing.dirs, vec!["docs".to_string()]);
        assert_eq!(listing.files, vec!["two.txt".to_string()]);

        let missing = store.list(7, Role::Primary, "nope").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_user_files_with_temp_suffix_stay_visible() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "report.wstmp", b"data".to_vec()).await.unwrap();
        store.write(7, Role::Primary, ".hidden.wstmp", b"data".to_vec()).await.unwrap();

        let listing = store.list(7, Role::Primary, "").await.unwrap();
        assert_eq!(listing.files, vec![".hidden.wstmp".to_string(), "report.wstmp".to_string()]);
        assert_eq!(store.files().await.unwrap().len(), 2);

        let reserved = temp_name("report");
        let write = store.write(7, Role::Primary, &reserved, b"x".to_vec()).await;
        assert!(matches!(write, Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_temp_name_shape() {
        assert!(is_temp_name(&temp_name("a.txt")));
        assert!(!is_temp_name("report.wstmp"));
        assert!(!is_temp_name(".a.txt.1234.wstmp"));
        assert!(!is_temp_name(&format!("{}{}", uuid::Uuid::new_v4(), TEMP_SUFFIX)));
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "gone.txt", b"x".to_vec()).await.unwrap();
        store.delete(7, Role::Primary, "gone.txt").await.unwrap();

        let err = store.delete(7, Role::Primary, "gone.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_operations_reject_escapes() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        let write = store.write(7, Role::Primary, "../8/x", b"x".to_vec()).await;
        assert!(matches!(write, Err(Error::InvalidPath { .. })));
        assert!(!dir.path().join("8").exists());

        assert!(matches!(store.read(7, Role::Primary, "/etc/hostname").await, Err(Error::InvalidPath { .. })));
        assert!(matches!(store.delete(7, Role::Primary, "..").await, Err(Error::InvalidPath { .. })));
        assert!(matches!(store.write(7, Role::Primary, "", b"x".to_vec()).await, Err(Error::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn test_digest_and_stat() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "notes.txt", b"hello".to_vec()).await.unwrap();
        let digest = store.digest_of(7, Role::Primary, "notes.txt").await.unwrap();
        assert_eq!(digest, hasher::digest_bytes(b"hello"));

        let meta = store.stat(7, Role::Primary, "notes.txt").await.unwrap();
        assert_eq!(meta.size, 5);

        assert!(store.digest_of(7, Role::Primary, "other.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_files_walks_all_partitions() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.write(7, Role::Primary, "a/b.txt", b"1".to_vec()).await.unwrap();
        store.write(9, Role::Backup, "c.txt", b"2".to_vec()).await.unwrap();
        std::fs::write(store.root().join("stray.txt"), b"3").unwrap();

        let files = store.files().await.unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|p| p.ends_with("7/a/b.txt")));
        assert!(files.iter().any(|p| p.ends_with("9_backup/c.txt")));
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_one_whole_version() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        let mut handles = Vec::new();
        for i in 0..10u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.write(7, Role::Primary, "race.bin", vec![i; 4096]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let data = store.read(7, Role::Primary, "race.bin").await.unwrap();
        assert_eq!(data.len(), 4096);
        assert!(data.iter().all(|b| *b == data[0]));
        assert!(store.list(7, Role::Primary, "").await.unwrap().files == vec!["race.bin".to_string()]);
    }
}
