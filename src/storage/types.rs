//! core type-safe identifiers and names for the storage layer.

use std::fmt;
use std::fmt::Formatter;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// number of hex characters in a full identifier
pub const ID_HEX_LEN: usize = 64;

/// number of leading hex characters used to pick a shard directory
pub const SHARD_WIDTH: usize = 2;

/// A full content digest, lowercase hex.
///
/// Only the storage layer builds these from raw strings; everything else
/// gets them from [`digest`] or from the store itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// parse a full-length hex identifier
    pub fn parse(hex: &str) -> Result<Self, InvalidNameError> {
        if hex.len() != ID_HEX_LEN {
            return Err(InvalidNameError::BadIdentifier(hex.to_string()));
        }
        if !is_lower_hex(hex) {
            return Err(InvalidNameError::BadIdentifier(hex.to_string()));
        }
        Ok(Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// the shard directory this id lives in
    pub fn shard(&self) -> &str {
        &self.0[..SHARD_WIDTH]
    }

    /// short form used in log output
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// hash raw bytes into an identifier
pub fn digest(bytes: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ObjectId(hex::encode(hasher.finalize()))
}

pub(crate) fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CommitId(ObjectId);

impl CommitId {
    pub fn new(id: ObjectId) -> Self {
        Self(id)
    }

    /// commit ids are derived from the message and the rendered timestamp only
    pub fn derive(message: &str, timestamp: &str) -> Self {
        let mut material = String::with_capacity(message.len() + timestamp.len());
        material.push_str(message);
        material.push_str(timestamp);
        Self(digest(material.as_bytes()))
    }

    pub fn parse(hex: &str) -> Result<Self, InvalidNameError> {
        ObjectId::parse(hex).map(Self)
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn short(&self) -> &str {
        self.0.short()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// blob identifier, the digest of the file bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlobId(ObjectId);

impl BlobId {
    pub fn new(id: ObjectId) -> Self {
        Self(id)
    }

    pub fn of(bytes: &[u8]) -> Self {
        Self(digest(bytes))
    }

    pub fn parse(hex: &str) -> Result<Self, InvalidNameError> {
        ObjectId::parse(hex).map(Self)
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated name of a file in the working directory.
///
/// Only files directly inside the working directory are versioned, so a
/// name is a single path component:
/// - not empty
/// - no `/` or `\`
/// - not `.` or `..`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_component(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// a branch name; branches live as flat files under `refs/`, so a name
/// may not start with `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    /// the default branch created by `init`
    pub const DEFAULT: &'static str = "master";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_component(&name)?;
        // ref files starting with '.' are in-flight atomic writes
        if name.starts_with('.') {
            return Err(InvalidNameError::InvalidCharacter {
                char: '.',
                position: 0,
            });
        }
        if name.chars().any(|c| c.is_whitespace()) {
            return Err(InvalidNameError::InvalidCharacter {
                char: ' ',
                position: name.find(char::is_whitespace).unwrap_or(0),
            });
        }
        Ok(Self(name))
    }

    pub fn default_branch() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_component(name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    if name == "." || name == ".." {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }
    for (i, c) in name.chars().enumerate() {
        if c == '/' || c == '\\' || c == '\0' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }
    Ok(())
}

/// error type for invalid names and identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
    BadIdentifier(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::BadIdentifier(id) => write!(f, "not a full identifier: '{}'", id),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = digest(b"hello");
        let b = digest(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), ID_HEX_LEN);
        assert_ne!(a, digest(b"hello!"));
    }

    #[test]
    fn test_commit_id_ignores_nothing_but_message_and_time() {
        let a = CommitId::derive("msg", "2024-01-01T00:00:00+00:00");
        let b = CommitId::derive("msg", "2024-01-01T00:00:00+00:00");
        let c = CommitId::derive("msg", "2024-01-01T00:00:01+00:00");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_object_id_parse() {
        let id = digest(b"x");
        assert_eq!(ObjectId::parse(id.as_str()).unwrap(), id);
        assert!(ObjectId::parse("abc").is_err());
        assert!(ObjectId::parse(&"G".repeat(ID_HEX_LEN)).is_err());
        assert_eq!(id.shard().len(), SHARD_WIDTH);
    }

    #[test]
    fn test_ids_serialize_as_plain_hex() {
        let blob = BlobId::of(b"x");
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, format!("\"{}\"", blob.as_str()));
        // reading back goes through the checked parser
        let raw: String = serde_json::from_str(&json).unwrap();
        assert_eq!(BlobId::parse(&raw).unwrap(), blob);
        assert!(BlobId::parse("abc").is_err());
    }

    #[test]
    fn test_file_name_valid() {
        assert!(FileName::new("a.txt").is_ok());
        assert!(FileName::new(".hidden").is_ok());
        assert!(FileName::new("with space.md").is_ok());
    }

    #[test]
    fn test_file_name_invalid() {
        assert_eq!(FileName::new(""), Err(InvalidNameError::Empty));
        assert!(FileName::new("dir/a.txt").is_err());
        assert!(FileName::new("..").is_err());
        assert!(FileName::new(".").is_err());
    }

    #[test]
    fn test_branch_name() {
        assert!(BranchName::new("feature-1").is_ok());
        assert!(BranchName::new("a b").is_err());
        assert!(BranchName::new("a/b").is_err());
        assert_eq!(
            BranchName::new(".wip"),
            Err(InvalidNameError::InvalidCharacter {
                char: '.',
                position: 0
            })
        );
        assert!(BranchName::new("wip.1").is_ok());
        assert_eq!(BranchName::default_branch().as_str(), "master");
    }
}
