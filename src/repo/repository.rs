//! The repository context.
//!
//! A [`Repository`] owns everything a command needs: the store handles, the
//! loaded commit graph, and the mutable tracking state. Each user-facing
//! command is a method. Commands validate first, then write to disk, and
//! only then update the in-memory state, so a failed write leaves the value
//! as it was before the call.

use std::fs;
use std::io;
use std::path::Path;

use crate::repo::config::RepositoryConfig;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::merge::{self, MergeOutcome, Resolution};
use crate::repo::status::{Modification, StatusReport};
use crate::repo::workdir::WorkingDir;
use crate::storage::{
    initial_commit, read_blob, read_table, write_atomic, write_blob, write_commit, write_table,
    BlobId, BranchName, BranchTable, Commit, CommitBuilder, CommitGraph, CommitId, CommitMessage,
    FileName, ObjectStore, RefManager, Snapshot, StagedChange, StagingTable, StorageError,
    StoreLayout,
};

/// A loaded repository.
#[derive(Debug)]
pub struct Repository {
    config: RepositoryConfig,
    layout: StoreLayout,
    workdir: WorkingDir,
    commits: ObjectStore,
    blobs: ObjectStore,
    graph: CommitGraph,
    head: Commit,
    current_branch: BranchName,
    branches: BranchTable,
    tracked: Snapshot,
    staged: StagingTable,
}

impl Repository {
    /// Create a new store in the configured working directory.
    pub fn init(config: RepositoryConfig) -> RepoResult<Self> {
        let layout = config.layout();
        if layout.exists() {
            return Err(RepoError::AlreadyInitialized(config.work_dir.clone()));
        }
        let branch = BranchName::new(config.default_branch.clone())?;

        layout.create()?;
        let commits = ObjectStore::new(layout.commits());
        let blobs = ObjectStore::new(layout.blobs());

        let root = initial_commit();
        write_commit(&commits, &root)?;
        RefManager::update_branch(&layout, &branch, &root.id)?;
        RefManager::set_current_branch(&layout, &branch)?;
        let tracked = Snapshot::new();
        let staged = StagingTable::new();
        write_table(&layout.tree(), &tracked)?;
        write_table(&layout.stage(), &staged)?;

        let mut graph = CommitGraph::new();
        graph.insert(root.clone())?;
        let mut branches = BranchTable::new();
        branches.put(branch.as_str(), root.id.clone());

        tracing::info!(
            root = %layout.root().display(),
            branch = %branch,
            "initialized repository"
        );

        Ok(Self {
            workdir: WorkingDir::new(&config.work_dir),
            config,
            layout,
            commits,
            blobs,
            graph,
            head: root,
            current_branch: branch,
            branches,
            tracked,
            staged,
        })
    }

    /// Load an existing store.
    ///
    /// Any inconsistency in the store (unreadable records, dangling parent
    /// or branch references) fails with a corruption error.
    pub fn load(config: RepositoryConfig) -> RepoResult<Self> {
        let layout = config.layout();
        if !layout.exists() {
            return Err(RepoError::NotInitialized(config.work_dir.clone()));
        }
        layout.verify()?;

        let commits = ObjectStore::new(layout.commits());
        let blobs = ObjectStore::new(layout.blobs());

        let tracked: Snapshot = read_table(&layout.tree())?;
        let staged: StagingTable = read_table(&layout.stage())?;
        let graph = CommitGraph::load(&commits)?;

        let branches = RefManager::list_branches(&layout)?;
        for entry in branches.iter() {
            if !graph.contains(entry.value) {
                return Err(StorageError::corrupt(
                    layout.refs().join(entry.name),
                    format!("branch points at unknown commit {}", entry.value),
                )
                .into());
            }
        }

        let current_branch = RefManager::current_branch(&layout)?;
        let head = branches
            .get(current_branch.as_str())
            .and_then(|id| graph.get(id))
            .cloned()
            .ok_or_else(|| {
                StorageError::corrupt(
                    layout.head(),
                    format!("current branch {} has no commit", current_branch),
                )
            })?;

        tracing::debug!(
            commits = graph.len(),
            branches = branches.size(),
            head = %head.id.short(),
            "loaded repository"
        );

        Ok(Self {
            workdir: WorkingDir::new(&config.work_dir),
            config,
            layout,
            commits,
            blobs,
            graph,
            head,
            current_branch,
            branches,
            tracked,
            staged,
        })
    }

    /// Persist the tracking state and release the repository.
    pub fn close(self) -> RepoResult<()> {
        self.flush(&self.tracked, &self.staged)
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn work_dir(&self) -> &Path {
        self.workdir.root()
    }

    pub fn head(&self) -> &Commit {
        &self.head
    }

    pub fn current_branch(&self) -> &BranchName {
        &self.current_branch
    }

    pub fn branches(&self) -> &BranchTable {
        &self.branches
    }

    pub fn tracked(&self) -> &Snapshot {
        &self.tracked
    }

    pub fn staged(&self) -> &StagingTable {
        &self.staged
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    // ==================== Staging ====================

    /// Stage the current content of a working file.
    pub fn add(&mut self, name: &str) -> RepoResult<()> {
        let name = FileName::new(name).map_err(|_| RepoError::FileNotFound(name.to_string()))?;
        let name = name.as_str();
        if !self.workdir.exists(name) {
            return Err(RepoError::FileNotFound(name.to_string()));
        }

        let bytes = self.workdir.read(name)?;
        let blob = BlobId::of(&bytes);
        let mut tracked = self.tracked.clone();
        let mut staged = self.staged.clone();

        let restores_removal = self.staged.get(name) == Some(&StagedChange::Remove)
            && self.head.snapshot.get(name) == Some(&blob);

        if self.tracked.get(name) == Some(&blob) || restores_removal {
            staged.remove(name);
            tracked.put(name, blob);
            self.drop_staged_copy(name)?;
            tracing::debug!(file = name, "content matches tracked version, unstaged");
        } else {
            write_atomic(&self.layout.index().join(name), &bytes)?;
            staged.put(name, StagedChange::Add(blob));
            tracing::debug!(file = name, "staged for addition");
        }

        self.flush(&tracked, &staged)?;
        self.tracked = tracked;
        self.staged = staged;
        Ok(())
    }

    /// Untrack a file, or unstage it if it was only staged.
    pub fn rm(&mut self, name: &str) -> RepoResult<()> {
        let is_staged = self.staged.get(name).and_then(StagedChange::blob).is_some();
        let is_tracked = self.tracked.contains(name);
        if !is_staged && !is_tracked {
            return Err(RepoError::NotTracked(name.to_string()));
        }

        let mut tracked = self.tracked.clone();
        let mut staged = self.staged.clone();
        if is_staged {
            staged.remove(name);
            self.drop_staged_copy(name)?;
        }
        if is_tracked {
            tracked.remove(name);
            staged.put(name, StagedChange::Remove);
            self.workdir.delete(name)?;
        }

        self.flush(&tracked, &staged)?;
        self.tracked = tracked;
        self.staged = staged;
        tracing::debug!(file = name, tracked = is_tracked, "removed");
        Ok(())
    }

    // ==================== Commits ====================

    /// Record the staged changes as a new commit on the current branch.
    pub fn commit(&mut self, message: &str) -> RepoResult<CommitId> {
        if message.trim().is_empty() {
            return Err(RepoError::EmptyCommitMessage);
        }
        if self.staged.is_empty() {
            return Err(RepoError::NothingToCommit);
        }

        let mut tracked = self.tracked.clone();
        for entry in self.staged.iter() {
            match entry.value {
                StagedChange::Add(blob) => {
                    self.promote_staged_copy(entry.name, blob)?;
                    tracked.put(entry.name, blob.clone());
                }
                StagedChange::Remove => {
                    tracked.remove(entry.name);
                }
            }
        }

        let commit = CommitBuilder::new()
            .message(message)
            .parent(self.head.id.clone())
            .snapshot(tracked.clone())
            .build();
        let id = commit.id.clone();

        let summary = commit.summary().to_owned();

        self.advance_branch(commit, tracked, StagingTable::new())?;
        tracing::info!(
            id = %id.short(),
            branch = %self.current_branch,
            summary = %summary,
            "created commit"
        );
        Ok(id)
    }

    /// First-parent history from head, newest first.
    pub fn log(&self) -> Vec<&Commit> {
        self.graph.first_parent_history(&self.head.id).collect()
    }

    /// Every commit, newest first; equal timestamps are ordered by id.
    pub fn global_log(&self) -> Vec<&Commit> {
        let mut all: Vec<&Commit> = self.graph.iter().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Ids of every commit with exactly this message, sorted.
    pub fn find(&self, message: &str) -> RepoResult<Vec<CommitId>> {
        let mut ids: Vec<CommitId> = self
            .graph
            .iter()
            .filter(|commit| commit.message == message)
            .map(|commit| commit.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(RepoError::NoCommitWithMessage(message.to_string()));
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve a full or abbreviated commit id.
    pub fn resolve_commit(&self, prefix: &str) -> RepoResult<&Commit> {
        let id = self
            .commits
            .resolve_prefix(prefix)
            .map_err(|e| RepoError::from_commit_lookup(prefix, e))?;
        let id = CommitId::new(id);
        self.graph
            .get(&id)
            .ok_or_else(|| RepoError::CommitNotFound(prefix.to_string()))
    }

    // ==================== Checkout ====================

    /// Restore one file from a commit (head when `commit` is `None`).
    pub fn checkout_file(&self, name: &str, commit: Option<&str>) -> RepoResult<()> {
        let source = match commit {
            Some(prefix) => self.resolve_commit(prefix)?,
            None => &self.head,
        };
        let blob = source
            .snapshot
            .get(name)
            .ok_or_else(|| RepoError::FileNotInCommit(name.to_string()))?;

        let bytes = read_blob(&self.blobs, blob)?;
        self.workdir.write(name, &bytes)?;
        tracing::debug!(file = name, commit = %source.id.short(), "restored file");
        Ok(())
    }

    /// Switch to another branch, replacing the working files.
    pub fn checkout_branch(&mut self, name: &str) -> RepoResult<()> {
        let branch = BranchName::new(name)?;
        let target = self
            .branches
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| RepoError::BranchNotFound(name.to_string()))?;
        if branch == self.current_branch {
            return Err(RepoError::AlreadyOnBranch(name.to_string()));
        }
        let destination = self.commit_in_graph(&target)?.clone();

        self.check_untracked(destination.snapshot.names())?;
        self.materialize(&destination.snapshot)?;
        RefManager::set_current_branch(&self.layout, &branch)?;
        self.flush(&destination.snapshot, &StagingTable::new())?;

        self.tracked = destination.snapshot.clone();
        self.staged.clear();
        self.head = destination;
        tracing::info!(from = %self.current_branch, to = %branch, "switched branch");
        self.current_branch = branch;
        Ok(())
    }

    // ==================== Branches ====================

    /// Create a branch at the current head.
    pub fn branch(&mut self, name: &str) -> RepoResult<()> {
        let branch = BranchName::new(name)?;
        if self.branches.contains(branch.as_str()) {
            return Err(RepoError::BranchExists(name.to_string()));
        }
        RefManager::update_branch(&self.layout, &branch, &self.head.id)?;
        self.branches.put(branch.as_str(), self.head.id.clone());
        tracing::info!(branch = %branch, at = %self.head.id.short(), "created branch");
        Ok(())
    }

    /// Delete a branch pointer. Its commits stay in the store.
    pub fn rm_branch(&mut self, name: &str) -> RepoResult<()> {
        if name == self.current_branch.as_str() {
            return Err(RepoError::CannotRemoveCurrentBranch(name.to_string()));
        }
        if !self.branches.contains(name) {
            return Err(RepoError::BranchNotFound(name.to_string()));
        }
        let branch = BranchName::new(name)?;
        RefManager::delete_branch(&self.layout, &branch)?;
        self.branches.remove(name);
        tracing::info!(branch = %branch, "removed branch");
        Ok(())
    }

    /// Move the current branch to an arbitrary commit.
    pub fn reset(&mut self, commit: &str) -> RepoResult<()> {
        let target = self.resolve_commit(commit)?.clone();

        self.check_untracked(target.snapshot.names())?;
        self.materialize(&target.snapshot)?;
        RefManager::update_branch(&self.layout, &self.current_branch, &target.id)?;
        self.flush(&target.snapshot, &StagingTable::new())?;

        self.branches.put(self.current_branch.as_str(), target.id.clone());
        self.tracked = target.snapshot.clone();
        self.staged.clear();
        tracing::info!(branch = %self.current_branch, to = %target.id.short(), "reset branch");
        self.head = target;
        Ok(())
    }

    // ==================== Merge ====================

    /// Merge another branch into the current one.
    pub fn merge(&mut self, name: &str) -> RepoResult<MergeOutcome> {
        let branch = BranchName::new(name)?;
        let other_id = self
            .branches
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| RepoError::BranchNotFound(name.to_string()))?;
        if branch == self.current_branch {
            return Err(RepoError::CannotMergeSelf);
        }
        if !self.staged.is_empty() {
            return Err(RepoError::UncommittedChanges);
        }

        let other = self.commit_in_graph(&other_id)?.clone();
        if self.graph.is_ancestor(&other.id, &self.head.id) {
            tracing::info!(other = %branch, "already up to date");
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        if self.graph.is_ancestor(&self.head.id, &other.id) {
            return self.fast_forward(other);
        }

        let split = merge::lowest_common_ancestor(&self.graph, &self.head.id, &other.id)
            .cloned()
            .ok_or_else(|| {
                StorageError::corrupt(
                    self.layout.commits(),
                    format!("{} and {} share no ancestor", self.head.id, other.id),
                )
            })?;

        let changes = merge::reconcile(&split.snapshot, &self.head.snapshot, &other.snapshot);
        self.check_untracked(changes.iter().filter_map(|(name, resolution)| {
            match resolution {
                Resolution::Delete => None,
                _ => Some(name.as_str()),
            }
        }))?;

        // read everything before the first write
        let mut writes: Vec<(String, Option<Vec<u8>>)> = Vec::with_capacity(changes.len());
        let mut conflicted = Vec::new();
        for (name, resolution) in &changes {
            let content = match resolution {
                Resolution::Take(blob) => Some(read_blob(&self.blobs, blob)?),
                Resolution::Delete => None,
                Resolution::Conflict { head: ours, other: theirs } => {
                    conflicted.push(name.clone());
                    let ours = self.read_optional_blob(ours.as_ref())?;
                    let theirs = self.read_optional_blob(theirs.as_ref())?;
                    Some(merge::render_conflict(&ours, &theirs))
                }
            };
            writes.push((name.clone(), content));
        }

        let mut tracked = self.head.snapshot.clone();
        for (name, content) in &writes {
            match content {
                Some(bytes) => {
                    let blob = write_blob(&self.blobs, bytes)?;
                    self.workdir.write(name, bytes)?;
                    tracked.put(name.as_str(), blob);
                }
                None => {
                    self.workdir.delete(name)?;
                    tracked.remove(name);
                }
            }
        }

        let commit = CommitBuilder::new()
            .message(CommitMessage::merge(branch.as_str(), self.current_branch.as_str()))
            .parent(self.head.id.clone())
            .second_parent(other.id.clone())
            .snapshot(tracked.clone())
            .build();
        let id = commit.id.clone();
        self.advance_branch(commit, tracked, StagingTable::new())?;

        if conflicted.is_empty() {
            tracing::info!(other = %branch, commit = %id.short(), "merged");
        } else {
            tracing::info!(
                other = %branch,
                commit = %id.short(),
                conflicts = conflicted.len(),
                "merged with conflicts"
            );
        }
        Ok(MergeOutcome::Merged {
            commit: id,
            conflicted,
        })
    }

    fn fast_forward(&mut self, target: Commit) -> RepoResult<MergeOutcome> {
        self.check_untracked(target.snapshot.names())?;
        self.materialize(&target.snapshot)?;
        RefManager::update_branch(&self.layout, &self.current_branch, &target.id)?;
        self.flush(&target.snapshot, &StagingTable::new())?;

        self.branches.put(self.current_branch.as_str(), target.id.clone());
        self.tracked = target.snapshot.clone();
        self.staged.clear();
        let id = target.id.clone();
        self.head = target;
        tracing::info!(branch = %self.current_branch, to = %id.short(), "fast-forwarded");
        Ok(MergeOutcome::FastForward(id))
    }

    // ==================== Status ====================

    /// Compare branches, staging, tracking and the working directory.
    pub fn status(&self) -> RepoResult<StatusReport> {
        let files = self.workdir.list_files()?;

        let mut staged = Vec::new();
        let mut removed = Vec::new();
        for entry in self.staged.iter() {
            match entry.value {
                StagedChange::Add(_) => staged.push(entry.name.to_string()),
                StagedChange::Remove => removed.push(entry.name.to_string()),
            }
        }

        // expected content: the staged version if any, else the tracked one
        let mut expected: Snapshot = self.tracked.clone();
        for entry in self.staged.iter() {
            if let StagedChange::Add(blob) = entry.value {
                expected.put(entry.name, blob.clone());
            }
        }

        let mut modified = Vec::new();
        for entry in expected.iter() {
            if !files.contains(entry.name) {
                modified.push((entry.name.to_string(), Modification::Deleted));
            } else if BlobId::of(&self.workdir.read(entry.name)?) != *entry.value {
                modified.push((entry.name.to_string(), Modification::Modified));
            }
        }

        let untracked = files
            .names()
            .filter(|name| !expected.contains(name))
            .map(str::to_string)
            .collect();

        Ok(StatusReport {
            current_branch: self.current_branch.to_string(),
            branches: self.branches.names().map(str::to_string).collect(),
            staged,
            removed,
            modified,
            untracked,
        })
    }

    // ==================== Internals ====================

    fn commit_in_graph(&self, id: &CommitId) -> RepoResult<&Commit> {
        self.graph.get(id).ok_or_else(|| {
            StorageError::corrupt(self.layout.commits(), format!("unknown commit {}", id)).into()
        })
    }

    /// fail if a working file nobody tracks or staged would be overwritten
    fn check_untracked<'a>(&self, incoming: impl Iterator<Item = &'a str>) -> RepoResult<()> {
        for name in incoming {
            let known = self.tracked.contains(name)
                || self.staged.get(name).and_then(StagedChange::blob).is_some();
            if !known && self.workdir.exists(name) {
                return Err(RepoError::UntrackedFileWouldBeOverwritten(name.to_string()));
            }
        }
        Ok(())
    }

    /// make the working directory match a snapshot and empty the index
    fn materialize(&self, snapshot: &Snapshot) -> RepoResult<()> {
        let mut contents = Vec::with_capacity(snapshot.size());
        for entry in snapshot.iter() {
            contents.push((entry.name, read_blob(&self.blobs, entry.value)?));
        }

        for (name, bytes) in &contents {
            self.workdir.write(name, bytes)?;
        }
        for name in self.tracked.names() {
            if !snapshot.contains(name) {
                self.workdir.delete(name)?;
            }
        }
        self.clear_index()
    }

    /// write the commit and move the current branch onto it
    fn advance_branch(
        &mut self,
        commit: Commit,
        tracked: Snapshot,
        staged: StagingTable,
    ) -> RepoResult<()> {
        write_commit(&self.commits, &commit)?;
        RefManager::update_branch(&self.layout, &self.current_branch, &commit.id)?;
        self.flush(&tracked, &staged)?;
        self.clear_index()?;
        self.graph.insert(commit.clone())?;

        self.branches.put(self.current_branch.as_str(), commit.id.clone());
        self.tracked = tracked;
        self.staged = staged;
        self.head = commit;
        Ok(())
    }

    /// copy a staged file from the index into the blob store
    fn promote_staged_copy(&self, name: &str, blob: &BlobId) -> RepoResult<()> {
        let path = self.layout.index().join(name);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::corrupt(&path, "staged copy is missing"),
            _ => StorageError::Io(e),
        })?;
        let stored = write_blob(&self.blobs, &bytes)?;
        if &stored != blob {
            return Err(StorageError::corrupt(path, "staged copy does not match its id").into());
        }
        Ok(())
    }

    fn drop_staged_copy(&self, name: &str) -> RepoResult<()> {
        match fs::remove_file(self.layout.index().join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_index(&self) -> RepoResult<()> {
        for entry in fs::read_dir(self.layout.index())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn read_optional_blob(&self, blob: Option<&BlobId>) -> RepoResult<Vec<u8>> {
        match blob {
            Some(blob) => Ok(read_blob(&self.blobs, blob)?),
            None => Ok(Vec::new()),
        }
    }

    fn flush(&self, tracked: &Snapshot, staged: &StagingTable) -> RepoResult<()> {
        write_table(&self.layout.tree(), tracked)?;
        write_table(&self.layout.stage(), staged)?;
        Ok(())
    }
}
