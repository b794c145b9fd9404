//!  Branch and HEAD records.
//!
//!  Branches are pointers to commits, one file per branch under `refs/`
//!  holding the tip commit id. `HEAD` holds the name of the current branch.
//!  This module handles:
//! - reading and writing the HEAD record
//! - branch record lifecycle (create, update, delete)
//! - loading the whole branch table

use std::fs;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::{read_record, write_atomic, StoreLayout};
use crate::storage::table::BranchTable;
use crate::storage::types::{BranchName, CommitId};

/// Manages branch records and HEAD.
pub struct RefManager;

impl RefManager {
    /// Name of the branch HEAD points at.
    pub fn current_branch(layout: &StoreLayout) -> StorageResult<BranchName> {
        let path = layout.head();
        let name = read_record(&path)?;
        BranchName::new(name).map_err(|e| StorageError::corrupt(path, e.to_string()))
    }

    /// Point HEAD at a branch.
    pub fn set_current_branch(layout: &StoreLayout, branch: &BranchName) -> StorageResult<()> {
        write_atomic(&layout.head(), branch.as_str().as_bytes())
    }

    /// Check if a branch record exists.
    pub fn branch_exists(layout: &StoreLayout, branch: &BranchName) -> bool {
        layout.refs().join(branch.as_str()).is_file()
    }

    /// Resolve a branch name to its tip commit.
    pub fn resolve_branch(layout: &StoreLayout, branch: &BranchName) -> StorageResult<CommitId> {
        let path = layout.refs().join(branch.as_str());
        if !path.is_file() {
            return Err(StorageError::NotFound(branch.to_string()));
        }
        let raw = read_record(&path)?;
        CommitId::parse(&raw).map_err(|e| StorageError::corrupt(path, e.to_string()))
    }

    /// Create or move a branch to point at `target`.
    pub fn update_branch(
        layout: &StoreLayout,
        branch: &BranchName,
        target: &CommitId,
    ) -> StorageResult<()> {
        write_atomic(&layout.refs().join(branch.as_str()), target.as_str().as_bytes())?;
        tracing::debug!(branch = %branch, target = %target.short(), "updated branch record");
        Ok(())
    }

    /// Delete a branch record.
    pub fn delete_branch(layout: &StoreLayout, branch: &BranchName) -> StorageResult<()> {
        let path = layout.refs().join(branch.as_str());
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(branch.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    /// Load every branch record into a table.
    pub fn list_branches(layout: &StoreLayout) -> StorageResult<BranchTable> {
        let mut table = BranchTable::new();
        for entry in fs::read_dir(layout.refs())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let branch = BranchName::new(name)
                .map_err(|e| StorageError::corrupt(entry.path(), e.to_string()))?;
            let target = Self::resolve_branch(layout, &branch)?;
            table.put(branch.as_str(), target);
        }
        Ok(table)
    }
}
