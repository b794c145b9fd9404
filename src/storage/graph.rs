//! In-memory commit DAG.
//!
//! Commit records sit in the store as independent files with no ordering
//! between a parent and its children, so the graph is rebuilt in two passes:
//!
//! 1. read every record into an arena slot, keeping parent ids as raw ids,
//!    and index each slot by its commit id;
//! 2. resolve every parent id to the arena slot of that parent.
//!
//! A parent id that is not in the index means the store is corrupt.
//! Parent links are arena indices, so the graph owns every commit exactly
//! once and has no reference cycles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use crate::storage::commit::{read_commit, Commit};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object_store::ObjectStore;
use crate::storage::types::CommitId;

#[derive(Debug, Clone)]
struct CommitNode {
    commit: Commit,
    /// arena slots of the first and second parent, filled in pass 2
    parents: [Option<usize>; 2],
}

/// The commit DAG.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    nodes: Vec<CommitNode>,
    index: HashMap<CommitId, usize>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// rebuild the graph from every commit record in `store`
    pub fn load(store: &ObjectStore) -> StorageResult<Self> {
        let mut records = Vec::new();
        for id in store.ids()? {
            let id = CommitId::new(id);
            records.push(read_commit(store, &id)?);
        }
        let graph = Self::from_commits(records, store.root())?;
        tracing::debug!(commits = graph.len(), "loaded commit graph");
        Ok(graph)
    }

    /// build a graph from records in any order
    ///
    /// `root` only labels the error when a parent is missing
    pub fn from_commits(
        commits: impl IntoIterator<Item = Commit>,
        root: &Path,
    ) -> StorageResult<Self> {
        let mut graph = Self::new();

        // pass 1: index
        for commit in commits {
            graph.index_commit(commit);
        }

        // pass 2: link
        for slot in 0..graph.nodes.len() {
            graph.link_parents(slot, root)?;
        }

        Ok(graph)
    }

    fn index_commit(&mut self, commit: Commit) -> usize {
        if let Some(&slot) = self.index.get(&commit.id) {
            return slot;
        }
        let slot = self.nodes.len();
        self.index.insert(commit.id.clone(), slot);
        self.nodes.push(CommitNode {
            commit,
            parents: [None, None],
        });
        slot
    }

    fn link_parents(&mut self, slot: usize, root: &Path) -> StorageResult<()> {
        let node = &self.nodes[slot];
        let mut resolved = [None, None];
        for (i, parent) in node.commit.parent_ids().enumerate() {
            let parent_slot = self.index.get(parent).copied().ok_or_else(|| {
                StorageError::corrupt(
                    root.join(node.commit.id.object_id().shard())
                        .join(node.commit.id.as_str()),
                    format!("parent commit {} is not in the store", parent),
                )
            })?;
            resolved[i] = Some(parent_slot);
        }
        self.nodes[slot].parents = resolved;
        Ok(())
    }

    /// add a commit created during this session
    ///
    /// its parents must already be in the graph; a commit whose id is
    /// already present is ignored (the first record wins)
    pub fn insert(&mut self, commit: Commit) -> StorageResult<()> {
        if self.index.contains_key(&commit.id) {
            return Ok(());
        }
        let slot = self.index_commit(commit);
        if let Err(e) = self.link_parents(slot, Path::new("")) {
            let node = self.nodes.pop();
            if let Some(node) = node {
                self.index.remove(&node.commit.id);
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: &CommitId) -> Option<&Commit> {
        self.index.get(id).map(|&slot| &self.nodes[slot].commit)
    }

    pub fn contains(&self, id: &CommitId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// every commit, in load order
    pub fn iter(&self) -> impl Iterator<Item = &Commit> {
        self.nodes.iter().map(|node| &node.commit)
    }

    /// resolved parents, first parent first
    pub fn parents(&self, id: &CommitId) -> Vec<&Commit> {
        match self.index.get(id) {
            Some(&slot) => self.nodes[slot]
                .parents
                .iter()
                .flatten()
                .map(|&p| &self.nodes[p].commit)
                .collect(),
            None => Vec::new(),
        }
    }

    /// every ancestor of `id` (including itself) with its distance from `id`
    ///
    /// breadth-first over both parent links, so the list is ordered by
    /// increasing depth and, within one depth, first parents come before
    /// second parents
    pub fn ancestors_with_depth(&self, id: &CommitId) -> Vec<(&Commit, usize)> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut out = Vec::new();
        seen.insert(start);
        queue.push_back((start, 0usize));

        while let Some((slot, depth)) = queue.pop_front() {
            out.push((&self.nodes[slot].commit, depth));
            for parent in self.nodes[slot].parents.iter().flatten() {
                if seen.insert(*parent) {
                    queue.push_back((*parent, depth + 1));
                }
            }
        }
        out
    }

    /// true when `ancestor` is reachable from `descendant` (or equal to it)
    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> bool {
        self.ancestors_with_depth(descendant)
            .iter()
            .any(|(commit, _)| &commit.id == ancestor)
    }

    /// walk first parents from `id` back to the root
    pub fn first_parent_history(&self, id: &CommitId) -> FirstParentHistory<'_> {
        FirstParentHistory {
            graph: self,
            next: self.index.get(id).copied(),
        }
    }
}

/// iterator over first-parent history, newest first
pub struct FirstParentHistory<'g> {
    graph: &'g CommitGraph,
    next: Option<usize>,
}

impl<'g> Iterator for FirstParentHistory<'g> {
    type Item = &'g Commit;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.next?;
        let node = &self.graph.nodes[slot];
        self.next = node.parents[0];
        Some(&node.commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::{initial_commit, write_commit, CommitBuilder};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn child(message: &str, secs: i64, parents: &[&Commit]) -> Commit {
        let mut builder = CommitBuilder::new()
            .message(message)
            .timestamp(Utc.timestamp_opt(secs, 0).single().unwrap());
        if let Some(first) = parents.first() {
            builder = builder.parent(first.id.clone());
        }
        if let Some(second) = parents.get(1) {
            builder = builder.second_parent(second.id.clone());
        }
        builder.build()
    }

    /// A → B, A → C, B → D, C → D
    fn diamond() -> Vec<Commit> {
        let a = initial_commit();
        let b = child("B", 10, &[&a]);
        let c = child("C", 11, &[&a]);
        let d = child("D", 12, &[&b, &c]);
        vec![a, b, c, d]
    }

    #[test]
    fn test_from_commits_any_order() {
        let commits = diamond();
        let forward = CommitGraph::from_commits(commits.clone(), Path::new("")).unwrap();
        let mut reversed = commits.clone();
        reversed.reverse();
        let backward = CommitGraph::from_commits(reversed, Path::new("")).unwrap();

        for commit in &commits {
            let f: Vec<_> = forward.parents(&commit.id).iter().map(|c| c.id.clone()).collect();
            let b: Vec<_> = backward.parents(&commit.id).iter().map(|c| c.id.clone()).collect();
            assert_eq!(f, b);
        }
        let d = &commits[3];
        let parents: Vec<_> = forward.parents(&d.id).iter().map(|c| c.message.clone()).collect();
        assert_eq!(parents, vec!["B", "C"]);
    }

    #[test]
    fn test_missing_parent_is_corruption() {
        let commits = diamond();
        // drop A
        let err = CommitGraph::from_commits(commits.into_iter().skip(1), Path::new("commits"))
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_load_from_store() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());
        let commits = diamond();
        for commit in commits.iter().rev() {
            write_commit(&store, commit).unwrap();
        }

        let graph = CommitGraph::load(&store).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.get(&commits[3].id).unwrap().message, "D");
        assert_eq!(graph.parents(&commits[1].id)[0].id, commits[0].id);
    }

    #[test]
    fn test_ancestors_with_depth() {
        let commits = diamond();
        let graph = CommitGraph::from_commits(commits.clone(), Path::new("")).unwrap();

        let walk: Vec<_> = graph
            .ancestors_with_depth(&commits[3].id)
            .into_iter()
            .map(|(c, d)| (c.message.clone(), d))
            .collect();
        assert_eq!(
            walk,
            vec![
                ("D".to_string(), 0),
                ("B".to_string(), 1),
                ("C".to_string(), 1),
                ("initial commit".to_string(), 2),
            ]
        );
        assert!(graph.is_ancestor(&commits[0].id, &commits[3].id));
        assert!(!graph.is_ancestor(&commits[1].id, &commits[2].id));
    }

    #[test]
    fn test_first_parent_history() {
        let commits = diamond();
        let graph = CommitGraph::from_commits(commits.clone(), Path::new("")).unwrap();
        let messages: Vec<_> = graph
            .first_parent_history(&commits[3].id)
            .map(|c| c.message.as_str())
            .collect();
        assert_eq!(messages, vec!["D", "B", "initial commit"]);
    }

    #[test]
    fn test_insert_requires_parent() {
        let mut graph = CommitGraph::new();
        let root = initial_commit();
        let orphan = child("orphan", 3, &[&child("ghost", 2, &[])]);

        graph.insert(root.clone()).unwrap();
        assert!(graph.insert(orphan.clone()).is_err());
        assert!(!graph.contains(&orphan.id));
        assert_eq!(graph.len(), 1);

        let next = child("next", 4, &[&root]);
        graph.insert(next.clone()).unwrap();
        assert_eq!(graph.parents(&next.id)[0].id, root.id);
    }
}
