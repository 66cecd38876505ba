//! Point-in-time listings of the shared download directory and their difference.
//!
//! The browser writes every download into one directory. Which files a page
//! visit produced is decided purely by comparing a listing taken before the
//! visit with one taken after it: a file is new when its identity (name plus
//! modification time) was absent before. Contents are never hashed.
//!
//! Nothing else may write into the shared directory during a run; the diff
//! cannot tell a foreign writer apart from the browser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::fs::{DirEntryInfo, FileSystem};

/// Identity of a file inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    /// File name within the snapshot directory.
    pub name: String,
    /// Modification marker; `None` when the platform reports no mtime.
    pub modified: Option<SystemTime>,
}

/// A file present in a later snapshot and absent from an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub identity: FileIdentity,
    pub size: u64,
}

impl NewFile {
    /// Returns the file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }
}

/// Regular files of one directory at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    path: PathBuf,
    entries: HashMap<FileIdentity, u64>,
}

impl DirectorySnapshot {
    /// Builds a snapshot from already-listed entries. Directories are ignored.
    pub fn from_entries(path: impl Into<PathBuf>, entries: impl IntoIterator<Item = DirEntryInfo>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| e.is_file)
            .map(|e| {
                (
                    FileIdentity {
                        name: e.name,
                        modified: e.modified,
                    },
                    e.size,
                )
            })
            .collect();
        Self {
            path: path.into(),
            entries,
        }
    }

    /// Returns the directory this snapshot was taken of.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of files in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the directory held no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if a file with this identity was present.
    #[must_use]
    pub fn contains(&self, identity: &FileIdentity) -> bool {
        self.entries.contains_key(identity)
    }
}

/// Files that appeared between two snapshots, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewFiles {
    dir: PathBuf,
    files: Vec<NewFile>,
}

impl NewFiles {
    /// Returns the directory the new files live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the full path of a new file.
    #[must_use]
    pub fn path_of(&self, file: &NewFile) -> PathBuf {
        self.dir.join(file.name())
    }

    #[must_use]
    pub fn files(&self) -> &[NewFile] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Splits off the files whose name satisfies `pred`, keeping the rest.
    #[must_use]
    pub fn split_off_where(&mut self, pred: impl Fn(&NewFile) -> bool) -> Vec<NewFile> {
        let (matched, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|f| pred(f));
        self.files = kept;
        matched
    }
}

/// Reads the regular files of `path`.
///
/// # Errors
///
/// Returns [`Error::NotADirectory`] if `path` is not a directory, or an I/O
/// error if it cannot be listed.
pub async fn snapshot<F: FileSystem + ?Sized>(fs: &F, path: &Path) -> Result<DirectorySnapshot> {
    if !fs.is_dir(path).await {
        return Err(Error::NotADirectory(path.to_path_buf()));
    }
    let entries = fs.list(path).await?;
    Ok(DirectorySnapshot::from_entries(path, entries))
}

/// Returns the files of `after` whose identity is absent from `before`.
#[must_use]
pub fn diff(before: &DirectorySnapshot, after: &DirectorySnapshot) -> NewFiles {
    let mut files: Vec<NewFile> = after
        .entries
        .iter()
        .filter(|(identity, _)| !before.contains(identity))
        .map(|(identity, size)| NewFile {
            identity: identity.clone(),
            size: *size,
        })
        .collect();
    files.sort_by(|a, b| a.identity.cmp(&b.identity));

    NewFiles {
        dir: after.path.clone(),
        files,
    }
}
