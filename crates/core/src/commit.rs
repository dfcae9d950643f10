//! Commits and directory objects.
//!
//! Both are addressed by the SHA-256 of their canonical JSON encoding. A commit
//! points at a root directory; a directory lists named entries that are either
//! files (carrying their byte size) or nested directories.

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::repo::RepoId;
use serde::{Deserialize, Serialize};

/// An immutable commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: ObjectId,
    pub repo_id: RepoId,
    pub root_id: ObjectId,
    pub parent_id: Option<ObjectId>,
    pub creator: String,
    pub description: String,
    /// Creation time in seconds since the Unix epoch.
    pub ctime: i64,
}

#[derive(Serialize)]
struct CommitBody<'a> {
    repo_id: &'a RepoId,
    root_id: &'a ObjectId,
    parent_id: &'a Option<ObjectId>,
    creator: &'a str,
    description: &'a str,
    ctime: i64,
}

impl Commit {
    /// Build a commit and derive its id from its content.
    pub fn new(
        repo_id: RepoId,
        root_id: ObjectId,
        parent_id: Option<ObjectId>,
        creator: impl Into<String>,
        description: impl Into<String>,
        ctime: i64,
    ) -> Self {
        let mut commit = Self {
            commit_id: ObjectId::EMPTY_DIR,
            repo_id,
            root_id,
            parent_id,
            creator: creator.into(),
            description: description.into(),
            ctime,
        };
        commit.commit_id = commit.compute_id();
        commit
    }

    /// Recompute the id from the commit's content.
    pub fn compute_id(&self) -> ObjectId {
        let body = CommitBody {
            repo_id: &self.repo_id,
            root_id: &self.root_id,
            parent_id: &self.parent_id,
            creator: &self.creator,
            description: &self.description,
            ctime: self.ctime,
        };
        // Serializing a struct of plain fields cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        ObjectId::compute(&bytes)
    }

    /// Whether the stored id matches the content.
    pub fn verify(&self) -> bool {
        self.compute_id() == self.commit_id
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode from storage bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Kind of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One named entry of a directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
    /// Byte size for files; always zero for directories.
    pub size: i64,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, id: ObjectId, size: i64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            id,
            size,
        }
    }

    /// Create a subdirectory entry.
    pub fn dir(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
            id,
            size: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// A directory object. Entries are kept sorted by name so the encoding is canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dir {
    entries: Vec<DirEntry>,
}

impl Dir {
    /// Build a directory, sorting entries by name.
    ///
    /// Rejects empty names, names containing `/`, duplicates, and files with a
    /// negative size.
    pub fn new(mut entries: Vec<DirEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(Error::InvalidPath(format!(
                    "duplicate entry name: {}",
                    pair[0].name
                )));
            }
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| e.name.is_empty() || e.name.contains('/'))
        {
            return Err(Error::InvalidPath(format!(
                "invalid entry name: {:?}",
                bad.name
            )));
        }
        if let Some(bad) = entries.iter().find(|e| !e.is_dir() && e.size < 0) {
            return Err(Error::InvalidEntry(format!(
                "negative size for {}: {}",
                bad.name, bad.size
            )));
        }
        Ok(Self { entries })
    }

    /// The empty directory.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content id of this directory. The empty directory maps to [`ObjectId::EMPTY_DIR`].
    pub fn id(&self) -> ObjectId {
        if self.entries.is_empty() {
            return ObjectId::EMPTY_DIR;
        }
        ObjectId::compute(&self.to_bytes().unwrap_or_default())
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode from storage bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let dir: Dir =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        // Re-validate ordering so lookups and diffs can rely on it.
        Self::new(dir.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(seed: &str) -> ObjectId {
        ObjectId::compute(seed.as_bytes())
    }

    #[test]
    fn test_commit_id_is_content_derived() {
        let repo_id = RepoId::new();
        let a = Commit::new(repo_id, ObjectId::EMPTY_DIR, None, "alice", "init", 1);
        let b = Commit::new(repo_id, ObjectId::EMPTY_DIR, None, "alice", "init", 1);
        let c = Commit::new(repo_id, ObjectId::EMPTY_DIR, None, "alice", "init", 2);
        assert_eq!(a.commit_id, b.commit_id);
        assert_ne!(a.commit_id, c.commit_id);
        assert!(a.verify());
    }

    #[test]
    fn test_commit_tamper_detected() {
        let mut commit = Commit::new(RepoId::new(), ObjectId::EMPTY_DIR, None, "a", "b", 1);
        commit.root_id = blob("other");
        assert!(!commit.verify());
    }

    #[test]
    fn test_dir_sorted_and_canonical() {
        let d1 = Dir::new(vec![
            DirEntry::file("b.txt", blob("b"), 2),
            DirEntry::file("a.txt", blob("a"), 1),
        ])
        .unwrap();
        let d2 = Dir::new(vec![
            DirEntry::file("a.txt", blob("a"), 1),
            DirEntry::file("b.txt", blob("b"), 2),
        ])
        .unwrap();
        assert_eq!(d1.entries()[0].name, "a.txt");
        assert_eq!(d1.id(), d2.id());
        assert_eq!(d1.get("b.txt").unwrap().size, 2);
        assert!(d1.get("c.txt").is_none());
    }

    #[test]
    fn test_dir_rejects_duplicates_and_bad_names() {
        assert!(
            Dir::new(vec![
                DirEntry::file("a", blob("1"), 1),
                DirEntry::file("a", blob("2"), 1),
            ])
            .is_err()
        );
        assert!(Dir::new(vec![DirEntry::file("a/b", blob("1"), 1)]).is_err());
        assert!(Dir::new(vec![DirEntry::file("", blob("1"), 1)]).is_err());
    }

    #[test]
    fn test_dir_rejects_negative_file_size() {
        let err = Dir::new(vec![
            DirEntry::file("ok", blob("1"), 0),
            DirEntry::file("bad", blob("2"), -1),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidEntry(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_rejects_negative_file_size() {
        let dir = Dir::new(vec![DirEntry::file("a", blob("a"), 10)]).unwrap();
        let json = String::from_utf8(dir.to_bytes().unwrap()).unwrap();
        let tampered = json.replace("\"size\":10", "\"size\":-10");
        assert_ne!(json, tampered);

        let err = Dir::from_bytes(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidEntry(_)), "got {err:?}");
    }

    #[test]
    fn test_empty_dir_has_reserved_id() {
        assert_eq!(Dir::empty().id(), ObjectId::EMPTY_DIR);
    }

    #[test]
    fn test_dir_bytes_roundtrip_preserves_id() {
        let dir = Dir::new(vec![
            DirEntry::dir("src", blob("tree")),
            DirEntry::file("README", blob("readme"), 120),
        ])
        .unwrap();
        let decoded = Dir::from_bytes(&dir.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.id(), dir.id());
    }
}
