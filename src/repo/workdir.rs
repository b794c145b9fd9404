//! Raw file access to the user's working directory.
//!
//! Only regular files directly inside the working directory are versioned;
//! subdirectories (including the marker directory) are never listed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::storage::{NameList, StorageResult};

/// the directory whose files are versioned
#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// true only for regular files
    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    pub fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        Ok(fs::read(self.path_of(name))?)
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        Ok(fs::write(self.path_of(name), bytes)?)
    }

    /// delete a file; returns false if it was already gone
    pub fn delete(&self, name: &str) -> StorageResult<bool> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// names of every regular file in the directory, sorted
    pub fn list_files(&self) -> StorageResult<NameList> {
        let mut files = NameList::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // non-utf8 names cannot be tracked
            if let Some(name) = entry.file_name().to_str() {
                files.put(name, ());
            }
        }
        Ok(files)
    }
}
