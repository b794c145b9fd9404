//! Repository error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::{InvalidNameError, StorageError};

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors that can occur during repository operations.
///
/// Every variant except `Storage` is a user error: the operation was
/// rejected before any state changed.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("A Gitlite version-control system already exists in {0}.")]
    AlreadyInitialized(PathBuf),

    #[error("Not in an initialized Gitlite directory.")]
    NotInitialized(PathBuf),

    #[error("File does not exist.")]
    FileNotFound(String),

    #[error("Please enter a commit message.")]
    EmptyCommitMessage,

    #[error("No changes added to the commit.")]
    NothingToCommit,

    #[error("No reason to remove the file.")]
    NotTracked(String),

    #[error("File does not exist in that commit.")]
    FileNotInCommit(String),

    #[error("No commit with that id exists.")]
    CommitNotFound(String),

    #[error("Commit id {0} is ambiguous.")]
    AmbiguousId(String),

    #[error("Found no commit with that message.")]
    NoCommitWithMessage(String),

    #[error("A branch with that name does not exist.")]
    BranchNotFound(String),

    #[error("A branch with that name already exists.")]
    BranchExists(String),

    #[error("Cannot remove the current branch.")]
    CannotRemoveCurrentBranch(String),

    #[error("No need to checkout the current branch.")]
    AlreadyOnBranch(String),

    #[error("There is an untracked file in the way; delete it, or add and commit it first.")]
    UntrackedFileWouldBeOverwritten(String),

    #[error("You have uncommitted changes.")]
    UncommittedChanges,

    #[error("Cannot merge a branch with itself.")]
    CannotMergeSelf,

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<std::io::Error> for RepoError {
    fn from(e: std::io::Error) -> Self {
        RepoError::Storage(StorageError::Io(e))
    }
}

impl RepoError {
    /// true when the request was rejected and nothing changed
    pub fn is_user_error(&self) -> bool {
        !matches!(self, RepoError::Storage(_))
    }

    /// true when the store cannot be trusted and must be reinitialized
    pub fn is_corruption(&self) -> bool {
        matches!(self, RepoError::Storage(e) if e.is_corruption())
    }

    /// map a prefix-resolution failure onto the commit-id user errors
    pub(crate) fn from_commit_lookup(prefix: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => RepoError::CommitNotFound(prefix.to_string()),
            StorageError::Ambiguous { .. } => RepoError::AmbiguousId(prefix.to_string()),
            other => RepoError::Storage(other),
        }
    }
}
