//! On-disk layout of a repository store.
//!
//! ```text
//! <work_dir>/.gitlite/
//!   HEAD               current branch name
//!   TREE               serialized tracked-file table
//!   STAGE              serialized staged-file table
//!   refs/<branch>      commit id of the branch tip
//!   index/<file>       raw bytes of staged files
//!   commits/<xx>/<id>  serialized commit records
//!   blobs/<xx>/<id>    raw blob bytes
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::storage::error::{StorageError, StorageResult};

/// default name of the marker directory inside the working directory
pub const DEFAULT_MARKER: &str = ".gitlite";

/// Paths of every record in the store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(work_dir: impl AsRef<Path>, marker: &str) -> Self {
        Self {
            root: work_dir.as_ref().join(marker),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn refs(&self) -> PathBuf {
        self.root.join("refs")
    }

    pub fn index(&self) -> PathBuf {
        self.root.join("index")
    }

    pub fn commits(&self) -> PathBuf {
        self.root.join("commits")
    }

    pub fn blobs(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn head(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    pub fn tree(&self) -> PathBuf {
        self.root.join("TREE")
    }

    pub fn stage(&self) -> PathBuf {
        self.root.join("STAGE")
    }

    /// true when the marker directory is present
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// create the directory skeleton; fails if the marker already exists
    pub fn create(&self) -> StorageResult<()> {
        fs::create_dir_all(self.root.parent().unwrap_or(Path::new(".")))?;
        fs::create_dir(&self.root)?;
        for dir in [self.refs(), self.index(), self.commits(), self.blobs()] {
            fs::create_dir(&dir)?;
        }
        tracing::debug!(root = %self.root.display(), "created store layout");
        Ok(())
    }

    /// check that every directory of the layout is present
    pub fn verify(&self) -> StorageResult<()> {
        for dir in [self.refs(), self.index(), self.commits(), self.blobs()] {
            if !dir.is_dir() {
                return Err(StorageError::corrupt(dir, "missing directory"));
            }
        }
        Ok(())
    }
}

/// write a record through a temporary sibling and rename it into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", file_name));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// read a small text record, trimming the trailing newline
pub(crate) fn read_record(path: &Path) -> StorageResult<String> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::corrupt(path, "record is missing")
        } else {
            StorageError::Io(e)
        }
    })?;
    Ok(content.trim_end_matches(['\n', '\r']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_verify() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path(), DEFAULT_MARKER);

        assert!(!layout.exists());
        layout.create().unwrap();
        assert!(layout.exists());
        layout.verify().unwrap();

        // second create must not succeed
        assert!(layout.create().is_err());
    }

    #[test]
    fn test_verify_detects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(dir.path(), DEFAULT_MARKER);
        layout.create().unwrap();
        fs::remove_dir(layout.blobs()).unwrap();

        let err = layout.verify().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_write_atomic_and_read_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("HEAD");
        write_atomic(&path, b"master\n").unwrap();
        assert_eq!(read_record(&path).unwrap(), "master");

        write_atomic(&path, b"feature").unwrap();
        assert_eq!(read_record(&path).unwrap(), "feature");
    }

    #[test]
    fn test_missing_record_is_corruption() {
        let dir = TempDir::new().unwrap();
        let err = read_record(&dir.path().join("TREE")).unwrap_err();
        assert!(err.is_corruption());
    }
}
