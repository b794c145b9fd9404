//! Ordered name → reference tables.
//!
//! One container type represents every snapshot-like list in the system:
//! the tracked files, the staging area, commit snapshots, the branch table
//! and working-directory listings. Entries are unique by name and always
//! iterate in ascending name order.
//!
//! On disk a table is a JSON array of `{"name": ..., "ref": ...}` objects,
//! sorted by name.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout::write_atomic;
use crate::storage::types::{BlobId, CommitId, InvalidNameError};

/// A value that can live in a [`FileTable`] and be persisted as a
/// reference string.
pub trait TableValue: Clone + PartialEq {
    fn to_ref(&self) -> String;
    fn from_ref(raw: &str) -> Result<Self, InvalidNameError>;
}

impl TableValue for BlobId {
    fn to_ref(&self) -> String {
        self.as_str().to_string()
    }

    fn from_ref(raw: &str) -> Result<Self, InvalidNameError> {
        BlobId::parse(raw)
    }
}

impl TableValue for CommitId {
    fn to_ref(&self) -> String {
        self.as_str().to_string()
    }

    fn from_ref(raw: &str) -> Result<Self, InvalidNameError> {
        CommitId::parse(raw)
    }
}

/// working-directory listings carry names only
impl TableValue for () {
    fn to_ref(&self) -> String {
        String::new()
    }

    fn from_ref(_raw: &str) -> Result<Self, InvalidNameError> {
        Ok(())
    }
}

/// a pending change in the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedChange {
    /// the file content is staged for the next commit
    Add(BlobId),
    /// the file is staged for removal
    Remove,
}

impl StagedChange {
    pub fn blob(&self) -> Option<&BlobId> {
        match self {
            StagedChange::Add(id) => Some(id),
            StagedChange::Remove => None,
        }
    }
}

impl TableValue for StagedChange {
    fn to_ref(&self) -> String {
        match self {
            StagedChange::Add(id) => id.to_ref(),
            StagedChange::Remove => String::new(),
        }
    }

    fn from_ref(raw: &str) -> Result<Self, InvalidNameError> {
        if raw.is_empty() {
            Ok(StagedChange::Remove)
        } else {
            BlobId::parse(raw).map(StagedChange::Add)
        }
    }
}

/// a borrowed view of one table entry
#[derive(Debug, PartialEq)]
pub struct Entry<'a, V> {
    pub name: &'a str,
    pub value: &'a V,
}

/// A sorted, unique-by-name table.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTable<V> {
    entries: BTreeMap<String, V>,
}

/// tracked files and commit snapshots
pub type Snapshot = FileTable<BlobId>;

/// the staging area
pub type StagingTable = FileTable<StagedChange>;

/// branch name → tip commit
pub type BranchTable = FileTable<CommitId>;

/// names of files present in the working directory
pub type NameList = FileTable<()>;

impl<V> Default for FileTable<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V: TableValue> FileTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// insert or overwrite; returns the value that was replaced, if any
    pub fn put(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(name.into(), value)
    }

    pub fn find(&self, name: &str) -> Option<Entry<'_, V>> {
        self.entries
            .get_key_value(name)
            .map(|(name, value)| Entry { name, value })
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// returns false when the name was absent
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// entries in ascending name order
    pub fn iter(&self) -> impl Iterator<Item = Entry<'_, V>> {
        self.entries.iter().map(|(name, value)| Entry { name, value })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<V: TableValue> FromIterator<(String, V)> for FileTable<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<V: TableValue> fmt::Display for FileTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.names() {
            writeln!(f, "{}", name)?;
        }
        Ok(())
    }
}

/// internal format for JSON serialization
#[derive(Serialize, Deserialize)]
struct EntryJson {
    name: String,
    #[serde(rename = "ref")]
    reference: String,
}

impl<V: TableValue> Serialize for FileTable<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            seq.serialize_element(&EntryJson {
                name: name.clone(),
                reference: value.to_ref(),
            })?;
        }
        seq.end()
    }
}

impl<'de, V: TableValue> Deserialize<'de> for FileTable<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor<V>(PhantomData<V>);

        impl<'de, V: TableValue> Visitor<'de> for TableVisitor<V> {
            type Value = FileTable<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a list of name/ref entries")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut table = FileTable::new();
                while let Some(entry) = seq.next_element::<EntryJson>()? {
                    let value = V::from_ref(&entry.reference).map_err(serde::de::Error::custom)?;
                    table.entries.insert(entry.name, value);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_seq(TableVisitor(PhantomData))
    }
}

/// read a persisted table record (`TREE`, `STAGE`)
pub fn read_table<V: TableValue>(path: &Path) -> StorageResult<FileTable<V>> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::corrupt(path, "record is missing")
        } else {
            StorageError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::corrupt(path, format!("unreadable table: {}", e)))
}

/// persist a table record
pub fn write_table<V: TableValue>(path: &Path, table: &FileTable<V>) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(table)?;
    write_atomic(path, &bytes)
}
