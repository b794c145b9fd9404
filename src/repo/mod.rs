//! Repository orchestration.
//!
//! [`Repository`] is the explicit context every command runs against. It
//! combines the storage layer with the user's working directory:
//!
//! ```text
//!   CLI command
//!        │
//!        ▼
//! ┌──────────────┐   merge    ┌──────────────┐
//! │  Repository  │──────────▶│ merge engine │
//! └──────────────┘            └──────────────┘
//!    │         │
//!    ▼         ▼
//! WorkingDir  storage (ObjectStore, RefManager, CommitGraph, tables)
//! ```

mod config;
mod error;
mod merge;
mod repository;
mod status;
mod workdir;

pub use config::RepositoryConfig;
pub use error::{RepoError, RepoResult};
pub use merge::{lowest_common_ancestor, reconcile, render_conflict, MergeOutcome, Resolution};
pub use repository::Repository;
pub use status::{Modification, StatusReport};
pub use workdir::WorkingDir;
