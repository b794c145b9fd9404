//! Content-addressed object store.
//!
//! Objects are immutable byte payloads named by a hex digest. Each object is
//! a single file at `<root>/<first two hex chars>/<full id>`, so no shard
//! directory grows past 256 siblings of the root. Writes are write-once: a
//! second write of an existing id is skipped.
//!
//! Commits and blobs use two separate stores rooted at different
//! directories, so ids from the two namespaces never meet.

use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::write_atomic;
use crate::storage::types::{digest, is_lower_hex, ObjectId, ID_HEX_LEN, SHARD_WIDTH};

/// A sharded, write-once key/value store on the filesystem.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// open a store rooted at `root`; the directory must already exist
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, shard: &str) -> PathBuf {
        self.root.join(shard)
    }

    /// path of the leaf file for an id
    pub fn path_of(&self, id: &ObjectId) -> PathBuf {
        self.shard_dir(id.shard()).join(id.as_str())
    }

    /// store bytes under their own digest
    ///
    /// idempotent: storing identical bytes again returns the same id and
    /// writes nothing
    pub fn put(&self, bytes: &[u8]) -> StorageResult<ObjectId> {
        let id = digest(bytes);
        self.insert(&id, bytes)?;
        Ok(id)
    }

    /// store bytes under a caller-chosen id
    ///
    /// returns `false` when the id was already present (nothing written)
    pub fn insert(&self, id: &ObjectId, bytes: &[u8]) -> StorageResult<bool> {
        let path = self.path_of(id);
        if path.is_file() {
            tracing::debug!(id = %id, "object already stored, skipping write");
            return Ok(false);
        }
        fs::create_dir_all(self.shard_dir(id.shard()))?;
        write_atomic(&path, bytes)?;
        tracing::debug!(id = %id, size = bytes.len(), "stored object");
        Ok(true)
    }

    /// read the bytes of an object
    pub fn get(&self, id: &ObjectId) -> StorageResult<Vec<u8>> {
        let path = self.path_of(id);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.path_of(id).is_file()
    }

    /// every stored id, in no particular order
    pub fn ids(&self) -> StorageResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            ids.extend(self.ids_in_shard(&shard.path())?);
        }
        Ok(ids)
    }

    fn ids_in_shard(&self, dir: &Path) -> StorageResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // leftovers of interrupted writes start with a dot
            if name.starts_with('.') {
                continue;
            }
            let id = ObjectId::parse(&name)
                .map_err(|_| StorageError::corrupt(entry.path(), "not an object id"))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// number of stored objects
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// resolve an abbreviated id to the single stored id it prefixes
    ///
    /// the prefix must be at least [`SHARD_WIDTH`] characters: only one shard
    /// directory is ever scanned
    pub fn resolve_prefix(&self, prefix: &str) -> StorageResult<ObjectId> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < SHARD_WIDTH || prefix.len() > ID_HEX_LEN || !is_lower_hex(&prefix) {
            return Err(StorageError::NotFound(prefix));
        }

        let dir = self.shard_dir(&prefix[..SHARD_WIDTH]);
        if !dir.is_dir() {
            return Err(StorageError::NotFound(prefix));
        }

        let mut matches: Vec<ObjectId> = self
            .ids_in_shard(&dir)?
            .into_iter()
            .filter(|id| id.as_str().starts_with(&prefix))
            .collect();

        tracing::debug!(prefix = %prefix, candidates = matches.len(), "resolved id prefix");
        match matches.len() {
            0 => Err(StorageError::NotFound(prefix)),
            1 => Ok(matches.remove(0)),
            n => Err(StorageError::Ambiguous {
                prefix,
                candidates: n,
            }),
        }
    }
}
