//! Size and file-count totals.

use crate::hash::ObjectId;
use serde::{Deserialize, Serialize};

/// Total byte size and file count of a tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeInfo {
    pub size: i64,
    pub file_count: i64,
}

impl SizeInfo {
    pub fn new(size: i64, file_count: i64) -> Self {
        Self { size, file_count }
    }
}

impl std::ops::Add for SizeInfo {
    type Output = SizeInfo;

    fn add(self, rhs: SizeInfo) -> SizeInfo {
        SizeInfo {
            size: self.size + rhs.size,
            file_count: self.file_count + rhs.file_count,
        }
    }
}

impl std::ops::AddAssign for SizeInfo {
    fn add_assign(&mut self, rhs: SizeInfo) {
        self.size += rhs.size;
        self.file_count += rhs.file_count;
    }
}

/// Persisted totals of a repository together with the head they were computed at.
///
/// When `head_id` equals the repository's live head, `size` and `file_count` are current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSizeInfo {
    pub head_id: ObjectId,
    pub size: i64,
    pub file_count: i64,
}

impl RepoSizeInfo {
    pub fn totals(&self) -> SizeInfo {
        SizeInfo::new(self.size, self.file_count)
    }
}
