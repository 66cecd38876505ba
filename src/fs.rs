//! File system abstraction for testability.

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File name within the listed directory.
    pub name: String,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
    /// Size in bytes.
    pub size: u64,
    /// Whether the entry is a regular file.
    pub is_file: bool,
}

/// Abstraction over file system operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Checks if the path exists and is a directory.
    async fn is_dir(&self, path: &Path) -> bool;

    /// Checks if anything exists at the given path.
    async fn exists(&self, path: &Path) -> bool;

    /// Lists the direct children of a directory.
    async fn list(&self, path: &Path) -> std::io::Result<Vec<DirEntryInfo>>;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Moves a file from `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn list(&self, path: &Path) -> std::io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            // Entries can vanish between readdir and stat while a download renames itself
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                modified: metadata.modified().ok(),
                size: metadata.len(),
                is_file: metadata.is_file(),
            });
        }
        Ok(entries)
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
