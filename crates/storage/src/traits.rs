//! Storage trait definitions.
//!
//! These are the collaborators size accounting consumes. Every method is
//! keyed by the store id because several repositories may share one store.

use crate::error::StorageResult;
use async_trait::async_trait;
use reposize_core::{ChangeEntry, Commit, Dir, ObjectId, SizeInfo, StoreId};

/// Load and write commit objects.
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Load a commit. Fails with `NotFound` if absent and `Corrupt` if its
    /// content does not match its id.
    async fn load_commit(&self, store_id: StoreId, commit_id: ObjectId) -> StorageResult<Commit>;

    /// Write a commit. Writing an existing commit is a no-op.
    async fn put_commit(&self, store_id: StoreId, commit: &Commit) -> StorageResult<()>;
}

/// Load and write directory objects.
#[async_trait]
pub trait DirStore: Send + Sync {
    /// Load a directory. The reserved empty id always resolves to the empty directory.
    async fn load_dir(&self, store_id: StoreId, dir_id: ObjectId) -> StorageResult<Dir>;

    /// Write a directory and return its id.
    async fn put_dir(&self, store_id: StoreId, dir: &Dir) -> StorageResult<ObjectId>;
}

/// Full-tree accounting.
#[async_trait]
pub trait TreeCounter: Send + Sync {
    /// Total size and file count reachable from `path` below `root_id`.
    /// `"/"` addresses the root itself.
    async fn count_tree(
        &self,
        store_id: StoreId,
        root_id: ObjectId,
        path: &str,
    ) -> StorageResult<SizeInfo>;
}

/// File-level diff between two commits.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    /// Changes turning `old`'s tree into `new`'s tree, ordered by path.
    async fn diff_commits(
        &self,
        store_id: StoreId,
        old: &Commit,
        new: &Commit,
    ) -> StorageResult<Vec<ChangeEntry>>;
}

/// Combined object store used by the size accountant.
pub trait ObjectStore: CommitStore + DirStore + TreeCounter + DiffProvider + Send + Sync {
    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
