//! Property-based tests for the storage containers, the commit graph and
//! the merge engine.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempfile::TempDir;

use gitlite::repo::{lowest_common_ancestor, reconcile, render_conflict, Resolution};
use gitlite::storage::{
    initial_commit, BlobId, Commit, CommitBuilder, CommitGraph, ObjectStore, Snapshot,
    StagedChange, StagingTable,
};

/// Strategy for generating working-directory file names.
fn file_name() -> impl Strategy<Value = String> {
    "[a-z0-9_.-]{1,12}".prop_filter("not a relative path", |s| s != "." && s != "..")
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(file_name(), "[a-z]{0,8}", 0..16).prop_map(|files| {
        files
            .into_iter()
            .map(|(name, content)| (name, BlobId::of(content.as_bytes())))
            .collect()
    })
}

#[derive(Debug, Clone)]
enum TableOp {
    Put(String, u8),
    Remove(String),
}

fn table_op() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (file_name(), any::<u8>()).prop_map(|(n, v)| TableOp::Put(n, v)),
        file_name().prop_map(TableOp::Remove),
    ]
}

/// Shape of a random DAG: for each commit after the root, a first parent
/// and an optional second parent among the earlier commits.
fn dag_shape() -> impl Strategy<Value = Vec<(prop::sample::Index, Option<prop::sample::Index>)>> {
    prop::collection::vec(
        (
            any::<prop::sample::Index>(),
            prop::option::of(any::<prop::sample::Index>()),
        ),
        0..12,
    )
}

fn build_dag(shape: &[(prop::sample::Index, Option<prop::sample::Index>)]) -> Vec<Commit> {
    let mut commits = vec![initial_commit()];
    for (i, (first, second)) in shape.iter().enumerate() {
        let first = commits[first.index(commits.len())].id.clone();
        let mut builder = CommitBuilder::new()
            .message(format!("c{}", i))
            .timestamp(Utc.timestamp_opt(1_000 + i as i64, 0).single().unwrap())
            .parent(first.clone());
        if let Some(second) = second {
            let second = commits[second.index(commits.len())].id.clone();
            if second != first {
                builder = builder.second_parent(second);
            }
        }
        commits.push(builder.build());
    }
    commits
}

proptest! {
    /// Any snapshot survives a serde round trip unchanged.
    #[test]
    fn snapshot_serde_roundtrip(snapshot in snapshot_strategy()) {
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, snapshot);
    }

    /// Staging tables keep removals through a round trip.
    #[test]
    fn staging_serde_roundtrip(
        entries in prop::collection::btree_map(file_name(), prop::option::of("[a-z]{1,8}"), 0..16)
    ) {
        let table: StagingTable = entries
            .into_iter()
            .map(|(name, content)| {
                let change = match content {
                    Some(c) => StagedChange::Add(BlobId::of(c.as_bytes())),
                    None => StagedChange::Remove,
                };
                (name, change)
            })
            .collect();
        let json = serde_json::to_vec(&table).unwrap();
        let parsed: StagingTable = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(parsed, table);
    }

    /// The table stays sorted and unique under any sequence of puts and removes.
    #[test]
    fn table_stays_sorted(ops in prop::collection::vec(table_op(), 0..64)) {
        let mut table = Snapshot::new();
        let mut model = BTreeMap::new();
        for op in ops {
            match op {
                TableOp::Put(name, v) => {
                    let blob = BlobId::of(&[v]);
                    prop_assert_eq!(table.put(name.clone(), blob.clone()), model.insert(name, blob));
                }
                TableOp::Remove(name) => {
                    prop_assert_eq!(table.remove(&name), model.remove(&name).is_some());
                }
            }
        }

        let names: Vec<&str> = table.names().collect();
        prop_assert!(names.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(table.size(), model.len());
        prop_assert_eq!(table.is_empty(), model.is_empty());
    }

    /// Storing the same bytes twice yields one object.
    #[test]
    fn object_store_put_is_idempotent(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());
        let a = store.put(&bytes).unwrap();
        let b = store.put(&bytes).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(store.len().unwrap(), 1);
        prop_assert_eq!(store.get(&a).unwrap(), bytes);
    }

    /// The graph links the same parents whatever order the records arrive in.
    #[test]
    fn graph_load_is_order_independent(
        shape in dag_shape(),
        keys in prop::collection::vec(any::<u64>(), 13),
    ) {
        let commits = build_dag(&shape);
        let mut shuffled: Vec<(u64, Commit)> = keys.into_iter().zip(commits.clone()).collect();
        shuffled.sort_by_key(|(k, _)| *k);

        let ordered = CommitGraph::from_commits(commits.clone(), Path::new("")).unwrap();
        let mixed =
            CommitGraph::from_commits(shuffled.into_iter().map(|(_, c)| c), Path::new("")).unwrap();

        prop_assert_eq!(ordered.len(), mixed.len());
        for commit in &commits {
            let a: Vec<_> = ordered.parents(&commit.id).iter().map(|c| c.id.clone()).collect();
            let b: Vec<_> = mixed.parents(&commit.id).iter().map(|c| c.id.clone()).collect();
            prop_assert_eq!(a, b);
        }
    }

    /// The common ancestor is reachable from both commits.
    #[test]
    fn lca_is_common_ancestor(
        shape in dag_shape(),
        x in any::<prop::sample::Index>(),
        y in any::<prop::sample::Index>(),
    ) {
        let commits = build_dag(&shape);
        let graph = CommitGraph::from_commits(commits.clone(), Path::new("")).unwrap();
        let a = &commits[x.index(commits.len())].id;
        let b = &commits[y.index(commits.len())].id;

        let lca = lowest_common_ancestor(&graph, a, b).unwrap();
        prop_assert!(graph.is_ancestor(&lca.id, a));
        prop_assert!(graph.is_ancestor(&lca.id, b));
        prop_assert_eq!(&lowest_common_ancestor(&graph, a, a).unwrap().id, a);
    }

    /// Merging a snapshot with itself, or with an unchanged side, changes nothing.
    #[test]
    fn reconcile_trivial_merges(split in snapshot_strategy(), head in snapshot_strategy()) {
        prop_assert!(reconcile(&split, &head, &head).is_empty());
        prop_assert!(reconcile(&split, &head, &split).is_empty());

        // taking every change of the other side reproduces it
        let changes = reconcile(&split, &split, &head);
        let mut merged = split.clone();
        for (name, resolution) in changes {
            match resolution {
                Resolution::Take(blob) => { merged.put(name, blob); }
                Resolution::Delete => { merged.remove(&name); }
                Resolution::Conflict { .. } => prop_assert!(false, "unexpected conflict"),
            }
        }
        prop_assert_eq!(merged, head);
    }

    /// Conflict markers always sit on their own lines.
    #[test]
    fn conflict_markers_on_own_lines(head in "[a-z\n]{0,20}", other in "[a-z\n]{0,20}") {
        let text = String::from_utf8(render_conflict(head.as_bytes(), other.as_bytes())).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines.first().copied(), Some("<<<<<<< HEAD"));
        prop_assert_eq!(lines.last().copied(), Some(">>>>>>>"));
        prop_assert!(lines.contains(&"======="));
        prop_assert!(text.ends_with('\n'));
    }
}
