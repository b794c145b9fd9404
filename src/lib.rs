//! gitlite - a small local version-control engine
//!
//! Files in a working directory are snapshotted into an object store kept
//! in `.gitlite/`. Commits form a DAG that is rebuilt from the store each
//! time a repository is loaded; branches, staging, checkout and three-way
//! merges run on top of it.
//!
//! # Example
//!
//! ```no_run
//! use gitlite::repo::{Repository, RepositoryConfig};
//!
//! let mut repo = Repository::init(RepositoryConfig::new("./project")).unwrap();
//! std::fs::write("./project/notes.txt", "hello\n").unwrap();
//! repo.add("notes.txt").unwrap();
//! repo.commit("add notes").unwrap();
//! repo.close().unwrap();
//! ```

pub mod repo;
pub mod storage;
