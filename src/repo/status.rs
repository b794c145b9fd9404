//! Status report: how branches, staging, tracking and the working
//! directory relate to each other.

use std::fmt;

/// why a tracked file shows up as not staged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Modified,
    Deleted,
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modification::Modified => write!(f, "modified"),
            Modification::Deleted => write!(f, "deleted"),
        }
    }
}

/// A read-only view of the repository state. Every list is sorted by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub current_branch: String,
    pub branches: Vec<String>,
    pub staged: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<(String, Modification)>,
    pub untracked: Vec<String>,
}

impl StatusReport {
    /// nothing staged, nothing changed, nothing untracked
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Branches ===")?;
        for branch in &self.branches {
            if *branch == self.current_branch {
                writeln!(f, "*{}", branch)?;
            } else {
                writeln!(f, "{}", branch)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "=== Staged Files ===")?;
        for name in &self.staged {
            writeln!(f, "{}", name)?;
        }

        writeln!(f)?;
        writeln!(f, "=== Removed Files ===")?;
        for name in &self.removed {
            writeln!(f, "{}", name)?;
        }

        writeln!(f)?;
        writeln!(f, "=== Modifications Not Staged For Commit ===")?;
        for (name, kind) in &self.modified {
            writeln!(f, "{} ({})", name, kind)?;
        }

        writeln!(f)?;
        writeln!(f, "=== Untracked Files ===")?;
        for name in &self.untracked {
            writeln!(f, "{}", name)?;
        }
        Ok(())
    }
}
