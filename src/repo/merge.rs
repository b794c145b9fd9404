//! Merge engine: common-ancestor search and three-way reconciliation.
//!
//! The engine is pure. It never touches the filesystem: the repository asks
//! it what to do and then performs the writes itself.

use std::collections::{BTreeSet, HashSet};

use crate::storage::{BlobId, Commit, CommitGraph, CommitId, Snapshot};

/// what a merge did to the current branch
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// the other branch is already contained in the current one
    AlreadyUpToDate,
    /// the current branch moved forward to the given commit
    FastForward(CommitId),
    /// a merge commit was created; `conflicted` lists files with markers
    Merged {
        commit: CommitId,
        conflicted: Vec<String>,
    },
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        matches!(self, MergeOutcome::Merged { conflicted, .. } if !conflicted.is_empty())
    }
}

/// how one file differs from the current head after merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// take this version from the other side
    Take(BlobId),
    /// the other side deleted a file head left untouched
    Delete,
    /// both sides changed the file differently; `None` means deleted
    Conflict {
        head: Option<BlobId>,
        other: Option<BlobId>,
    },
}

/// Find the lowest common ancestor of two commits.
///
/// Every ancestor of `head` is collected first. The ancestors of `other` are
/// then visited breadth-first (first parent before second) and the first
/// one also reachable from `head` wins, so ties go to the commit nearest to
/// `other`.
pub fn lowest_common_ancestor<'g>(
    graph: &'g CommitGraph,
    head: &CommitId,
    other: &CommitId,
) -> Option<&'g Commit> {
    let head_side: HashSet<&CommitId> = graph
        .ancestors_with_depth(head)
        .into_iter()
        .map(|(commit, _)| &commit.id)
        .collect();

    graph
        .ancestors_with_depth(other)
        .into_iter()
        .map(|(commit, _)| commit)
        .find(|commit| head_side.contains(&commit.id))
}

/// Three-way reconcile the snapshots of the split point, head and other.
///
/// Only files whose merged result differs from head are returned, in name
/// order.
pub fn reconcile(split: &Snapshot, head: &Snapshot, other: &Snapshot) -> Vec<(String, Resolution)> {
    let names: BTreeSet<&str> = split
        .names()
        .chain(head.names())
        .chain(other.names())
        .collect();

    let mut changes = Vec::new();
    for name in names {
        let s = split.get(name);
        let h = head.get(name);
        let o = other.get(name);

        let resolution = if h == o || o == s {
            // same result on both sides, or only head changed
            continue;
        } else if h == s {
            match o {
                Some(blob) => Resolution::Take(blob.clone()),
                None => Resolution::Delete,
            }
        } else {
            Resolution::Conflict {
                head: h.cloned(),
                other: o.cloned(),
            }
        };
        changes.push((name.to_string(), resolution));
    }
    changes
}

/// Render the content of a conflicted file.
pub fn render_conflict(head: &[u8], other: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(head.len() + other.len() + 32);
    out.extend_from_slice(b"<<<<<<< HEAD\n");
    push_section(&mut out, head);
    out.extend_from_slice(b"=======\n");
    push_section(&mut out, other);
    out.extend_from_slice(b">>>>>>>\n");
    out
}

fn push_section(out: &mut Vec<u8>, content: &[u8]) {
    out.extend_from_slice(content);
    if !content.is_empty() && !content.ends_with(b"\n") {
        out.push(b'\n');
    }
}
