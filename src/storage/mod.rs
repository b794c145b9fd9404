//! storage layer for gitlite
//!
//! this module owns everything that lives under the marker directory: the
//! content-addressed object stores, the commit records, the branch and HEAD
//! records, and the persisted tables. The orchestration layer in
//! [`crate::repo`] uses this API and never touches the store files directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        StoreLayout                          │
//! │        (paths of HEAD, TREE, STAGE, refs, index, ...)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ ObjectStore │       │ ObjectStore │       │ RefManager  │
//!  │  (commits)  │       │   (blobs)   │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │
//!         ▼
//!  ┌─────────────┐
//!  │ CommitGraph │
//!  │   (DAG)     │
//!  └─────────────┘
//!  ```
//!
//! [`FileTable`] is the one ordered container used for snapshots, the
//! staging area, the branch table and working-directory listings.

mod blob;
mod commit;
mod error;
mod graph;
mod layout;
mod object_store;
mod refs;
mod table;
mod types;

// Re-export public API
pub use blob::{read_blob, write_blob};
pub use commit::{
    initial_commit, read_commit, render_time, write_commit, Commit, CommitBuilder,
    CommitMessage, LogEntry,
};
pub use error::{StorageError, StorageResult};
pub use graph::{CommitGraph, FirstParentHistory};
pub use layout::{StoreLayout, DEFAULT_MARKER};
pub use object_store::ObjectStore;
pub use refs::RefManager;
pub use table::{
    read_table, write_table, BranchTable, Entry, FileTable, NameList, Snapshot, StagedChange,
    StagingTable, TableValue,
};
pub use types::{
    digest, BlobId, BranchName, CommitId, FileName, InvalidNameError, ObjectId, ID_HEX_LEN,
    SHARD_WIDTH,
};

// Re-export for internal use by other modules
pub(crate) use layout::write_atomic;
