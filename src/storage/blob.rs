//!  Blob operations for file contents.
//!
//! A blob is the raw bytes of one version of one file, stored once under
//! the digest of those bytes. Blobs are never rewritten.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object_store::ObjectStore;
use crate::storage::types::BlobId;

/// write file content as a blob
///
/// returns the blob ID (digest of the content); storing the same content
/// twice is a no-op
pub fn write_blob(store: &ObjectStore, bytes: &[u8]) -> StorageResult<BlobId> {
    let id = store.put(bytes)?;
    Ok(BlobId::new(id))
}

/// read a blob's content from the store
pub fn read_blob(store: &ObjectStore, blob_id: &BlobId) -> StorageResult<Vec<u8>> {
    store.get(blob_id.object_id()).map_err(|e| match e {
        StorageError::NotFound(_) => StorageError::corrupt(
            store.path_of(blob_id.object_id()),
            "blob referenced by a snapshot is missing",
        ),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());

        let id = write_blob(&store, b"line one\nline two\n").unwrap();
        assert_eq!(id, BlobId::of(b"line one\nline two\n"));
        assert_eq!(read_blob(&store, &id).unwrap(), b"line one\nline two\n");
    }

    #[test]
    fn test_missing_blob_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());

        let err = read_blob(&store, &BlobId::of(b"never stored")).unwrap_err();
        assert!(err.is_corruption());
    }
}
