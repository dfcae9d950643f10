//! Path-level changes between two commits.

use serde::{Deserialize, Serialize};

/// What happened to a path between two commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Deleted,
    Modified,
}

/// One file that differs between two commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub status: DiffStatus,
    /// Full path from the repository root, starting with `/`.
    pub path: String,
    /// Size in the new commit. For deletions, the size the file had before removal.
    pub size: i64,
    /// Size in the old commit; only meaningful for [`DiffStatus::Modified`].
    pub prior_size: i64,
}

impl ChangeEntry {
    pub fn added(path: impl Into<String>, size: i64) -> Self {
        Self {
            status: DiffStatus::Added,
            path: path.into(),
            size,
            prior_size: 0,
        }
    }

    pub fn deleted(path: impl Into<String>, size: i64) -> Self {
        Self {
            status: DiffStatus::Deleted,
            path: path.into(),
            size,
            prior_size: 0,
        }
    }

    pub fn modified(path: impl Into<String>, size: i64, prior_size: i64) -> Self {
        Self {
            status: DiffStatus::Modified,
            path: path.into(),
            size,
            prior_size,
        }
    }
}
