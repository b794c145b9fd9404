//!  Commit records.
//!
//!  A commit is an immutable snapshot of the tracked files plus up to two
//!  parent links. Its id is the digest of the message and the rendered
//!  timestamp only; the snapshot does not take part in the id, so two
//!  commits with the same message and time share an id and the store keeps
//!  whichever was written first.
//!
//!  This module handles commit construction, the persisted record format
//!  and the log rendering of a single commit.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object_store::ObjectStore;
use crate::storage::table::Snapshot;
use crate::storage::types::CommitId;

/// An immutable commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub id: CommitId,
    pub message: String,
    /// rendered timestamp; this exact string feeds the id
    pub time: String,
    pub timestamp: DateTime<Utc>,
    pub parent: Option<CommitId>,
    pub second_parent: Option<CommitId>,
    pub snapshot: Snapshot,
}

impl Commit {
    /// a commit with no parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// check if this is a merge commit (has two parents)
    pub fn is_merge(&self) -> bool {
        self.second_parent.is_some()
    }

    /// parents in walk order: first parent, then second
    pub fn parent_ids(&self) -> impl Iterator<Item = &CommitId> {
        self.parent.iter().chain(self.second_parent.iter())
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    /// render the entry shown by `log` and `global-log`
    pub fn log_entry(&self) -> LogEntry<'_> {
        LogEntry { commit: self }
    }
}

/// render a timestamp the way commit ids are derived from it
pub fn render_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// builder for creating commits with a fluent interface
#[derive(Debug, Default)]
pub struct CommitBuilder {
    message: String,
    timestamp: Option<DateTime<Utc>>,
    parent: Option<CommitId>,
    second_parent: Option<CommitId>,
    snapshot: Snapshot,
}

impl CommitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the commit time (defaults to now)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// set the first parent
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// set the second parent (merge commits)
    pub fn second_parent(mut self, parent: CommitId) -> Self {
        self.second_parent = Some(parent);
        self
    }

    /// set the tracked files
    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn build(self) -> Commit {
        // stored times carry microseconds; keep the in-memory value identical
        let timestamp = self.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let time = render_time(&timestamp);
        Commit {
            id: CommitId::derive(&self.message, &time),
            message: self.message,
            time,
            timestamp,
            parent: self.parent,
            second_parent: self.second_parent,
            snapshot: self.snapshot,
        }
    }
}

/// the parentless commit every repository starts from
pub fn initial_commit() -> Commit {
    CommitBuilder::new()
        .message(CommitMessage::INITIAL)
        .timestamp(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
        .build()
}

/// message formatting for generated commits
pub struct CommitMessage;

impl CommitMessage {
    /// message of the root commit
    pub const INITIAL: &'static str = "initial commit";

    /// message of a merge commit
    pub fn merge(other: &str, current: &str) -> String {
        format!("Merged {} into {}.", other, current)
    }
}

/// internal format for JSON serialization
///
/// missing parents are stored as empty strings
#[derive(Serialize, Deserialize)]
struct CommitRecord {
    message: String,
    time: String,
    commit_id: String,
    parent_ref: String,
    second_parent_ref: String,
    tracked_files: Snapshot,
}

/// serialize a commit to JSON bytes
pub fn serialize_commit(commit: &Commit) -> StorageResult<Vec<u8>> {
    let record = CommitRecord {
        message: commit.message.clone(),
        time: commit.time.clone(),
        commit_id: commit.id.to_string(),
        parent_ref: commit.parent.as_ref().map(ToString::to_string).unwrap_or_default(),
        second_parent_ref: commit
            .second_parent
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        tracked_files: commit.snapshot.clone(),
    };
    Ok(serde_json::to_vec_pretty(&record)?)
}

/// deserialize a commit from JSON bytes
///
/// `path` is only used to report where a malformed record lives
pub fn deserialize_commit(bytes: &[u8], path: &Path) -> StorageResult<Commit> {
    let record: CommitRecord = serde_json::from_slice(bytes)
        .map_err(|e| StorageError::corrupt(path, format!("unreadable commit record: {}", e)))?;

    let id = CommitId::parse(&record.commit_id)
        .map_err(|e| StorageError::corrupt(path, e.to_string()))?;
    let parent = parse_parent(&record.parent_ref, path)?;
    let second_parent = parse_parent(&record.second_parent_ref, path)?;
    let timestamp = DateTime::parse_from_rfc3339(&record.time)
        .map_err(|e| StorageError::corrupt(path, format!("bad commit time: {}", e)))?
        .with_timezone(&Utc);

    Ok(Commit {
        id,
        message: record.message,
        time: record.time,
        timestamp,
        parent,
        second_parent,
        snapshot: record.tracked_files,
    })
}

fn parse_parent(raw: &str, path: &Path) -> StorageResult<Option<CommitId>> {
    if raw.is_empty() {
        return Ok(None);
    }
    CommitId::parse(raw)
        .map(Some)
        .map_err(|e| StorageError::corrupt(path, e.to_string()))
}

/// persist a commit record under its id
///
/// returns false when a record with that id was already stored
pub fn write_commit(store: &ObjectStore, commit: &Commit) -> StorageResult<bool> {
    let bytes = serialize_commit(commit)?;
    let written = store.insert(commit.id.object_id(), &bytes)?;
    if !written {
        tracing::warn!(
            id = %commit.id,
            "a commit with the same message and time is already stored; keeping the stored record"
        );
    }
    Ok(written)
}

/// read a commit record and check it is stored under its own id
pub fn read_commit(store: &ObjectStore, id: &CommitId) -> StorageResult<Commit> {
    let path = store.path_of(id.object_id());
    let bytes = store.get(id.object_id())?;
    let commit = deserialize_commit(&bytes, &path)?;
    if &commit.id != id {
        return Err(StorageError::corrupt(
            path,
            format!("record claims id {}", commit.id),
        ));
    }
    Ok(commit)
}

/// the `log` rendering of one commit
pub struct LogEntry<'a> {
    commit: &'a Commit,
}

impl fmt::Display for LogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let commit = self.commit;
        writeln!(f, "===")?;
        writeln!(f, "commit {}", commit.id)?;
        if let (Some(first), Some(second)) = (&commit.parent, &commit.second_parent) {
            writeln!(f, "Merge: {} {}", first.short(), second.short())?;
        }
        let local = commit.timestamp.with_timezone(&Local);
        writeln!(f, "Date: {}", local.format("%a %b %-d %H:%M:%S %Y %z"))?;
        writeln!(f, "{}", commit.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::BlobId;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_initial_commit() {
        let root = initial_commit();
        assert!(root.is_root());
        assert!(!root.is_merge());
        assert!(root.snapshot.is_empty());
        assert_eq!(root.message, "initial commit");

        // every repository starts from the same root
        assert_eq!(root.id, initial_commit().id);
    }

    #[test]
    fn test_commit_builder() {
        let root = initial_commit();
        let mut snapshot = Snapshot::new();
        snapshot.put("a.txt", BlobId::of(b"x"));

        let commit = CommitBuilder::new()
            .message("first")
            .timestamp(at(100))
            .parent(root.id.clone())
            .snapshot(snapshot.clone())
            .build();

        assert_eq!(commit.parent, Some(root.id.clone()));
        assert_eq!(commit.snapshot, snapshot);
        assert_eq!(commit.summary(), "first");
        assert_eq!(commit.id, CommitId::derive("first", &render_time(&at(100))));
    }

    #[test]
    fn test_id_ignores_snapshot() {
        let mut snapshot = Snapshot::new();
        snapshot.put("a.txt", BlobId::of(b"x"));

        let a = CommitBuilder::new().message("m").timestamp(at(5)).build();
        let b = CommitBuilder::new()
            .message("m")
            .timestamp(at(5))
            .snapshot(snapshot)
            .build();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_record_roundtrip_through_store() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());

        let root = initial_commit();
        let other = CommitBuilder::new().message("side").timestamp(at(7)).build();
        let mut snapshot = Snapshot::new();
        snapshot.put("f", BlobId::of(b"f"));
        let merge = CommitBuilder::new()
            .message(CommitMessage::merge("side", "master"))
            .timestamp(at(9))
            .parent(root.id.clone())
            .second_parent(other.id.clone())
            .snapshot(snapshot)
            .build();

        assert!(write_commit(&store, &merge).unwrap());
        let restored = read_commit(&store, &merge.id).unwrap();
        assert_eq!(restored, merge);
        assert!(restored.is_merge());
    }

    #[test]
    fn test_write_commit_keeps_first_record() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());

        let first = CommitBuilder::new().message("same").timestamp(at(1)).build();
        let mut snapshot = Snapshot::new();
        snapshot.put("x", BlobId::of(b"x"));
        let second = CommitBuilder::new()
            .message("same")
            .timestamp(at(1))
            .snapshot(snapshot)
            .build();

        assert!(write_commit(&store, &first).unwrap());
        assert!(!write_commit(&store, &second).unwrap());
        assert!(read_commit(&store, &first.id).unwrap().snapshot.is_empty());
    }

    #[test]
    fn test_malformed_record_is_corruption() {
        let err = deserialize_commit(b"{not json", Path::new("commits/ab/x")).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_log_entry_format() {
        let root = initial_commit();
        let side = CommitBuilder::new().message("side").timestamp(at(3)).build();
        let merge = CommitBuilder::new()
            .message("Merged side into master.")
            .timestamp(at(4))
            .parent(root.id.clone())
            .second_parent(side.id.clone())
            .build();

        let text = merge.log_entry().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "===");
        assert_eq!(lines[1], format!("commit {}", merge.id));
        assert_eq!(lines[2], format!("Merge: {} {}", root.id.short(), side.id.short()));
        assert!(lines[3].starts_with("Date: "));
        assert_eq!(lines[4], "Merged side into master.");

        let plain = root.log_entry().to_string();
        assert!(!plain.contains("Merge:"));
    }
}
