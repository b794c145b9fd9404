//! Repository configuration.

use std::path::PathBuf;

use crate::storage::{BranchName, StoreLayout, DEFAULT_MARKER};

/// Repository configuration options.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// The working directory whose files are versioned.
    pub work_dir: PathBuf,
    /// Name of the store directory inside `work_dir`.
    pub marker_dir: String,
    /// Branch created by `init`.
    pub default_branch: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            marker_dir: DEFAULT_MARKER.to_string(),
            default_branch: BranchName::DEFAULT.to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Create a new configuration for the given working directory.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }

    /// Set the store directory name.
    pub fn marker_dir(mut self, value: impl Into<String>) -> Self {
        self.marker_dir = value.into();
        self
    }

    /// Set the branch created by `init`.
    pub fn default_branch(mut self, value: impl Into<String>) -> Self {
        self.default_branch = value.into();
        self
    }

    /// Paths of the store described by this configuration.
    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.work_dir, &self.marker_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.marker_dir, ".gitlite");
        assert_eq!(config.default_branch, "master");
        assert_eq!(config.layout().root(), PathBuf::from("./.gitlite"));
    }

    #[test]
    fn test_builder() {
        let config = RepositoryConfig::new("/tmp/work")
            .marker_dir(".vcs")
            .default_branch("main");
        assert_eq!(config.work_dir, PathBuf::from("/tmp/work"));
        assert_eq!(config.layout().root(), PathBuf::from("/tmp/work/.vcs"));
        assert_eq!(config.default_branch, "main");
    }
}
