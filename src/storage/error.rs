//! Storage layer error types
//!
//! All errors that can occur while reading or writing the object store,
//! the ref records and the table records are defined here.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no stored object has this id (or id prefix)
    #[error("object not found: {0}")]
    NotFound(String),

    /// the id prefix matches more than one stored object
    #[error("ambiguous id prefix {prefix}: {candidates} candidates")]
    Ambiguous { prefix: String, candidates: usize },

    /// the on-disk store is internally inconsistent
    #[error("corrupt store at {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// invalid file name, branch name or identifier
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),
}

impl StorageError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// check if this error indicates the object doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// check if this error means the store cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptStore { .. } | StorageError::Serialization(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
