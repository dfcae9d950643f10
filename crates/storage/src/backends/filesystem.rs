//! Local filesystem object store.
//!
//! Layout, one subdirectory per store:
//! ```text
//! <root>/<store_id>/commits/<aa>/<remaining 62 hex chars>
//! <root>/<store_id>/fs/<aa>/<remaining 62 hex chars>
//! ```

use crate::error::{StorageError, StorageResult};
use crate::traits::{CommitStore, DiffProvider, DirStore, ObjectStore, TreeCounter};
use crate::walk;
use async_trait::async_trait;
use reposize_core::{ChangeEntry, Commit, Dir, ObjectId, SizeInfo, StoreId};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const COMMITS_DIR: &str = "commits";
const FS_DIR: &str = "fs";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, store_id: StoreId, kind: &str, id: ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root
            .join(store_id.to_string())
            .join(kind)
            .join(&hex[..2])
            .join(&hex[2..])
    }

    async fn read_object(&self, path: &Path, what: String) -> StorageResult<Vec<u8>> {
        fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(what)
            } else {
                StorageError::Io(e)
            }
        })
    }

    /// Write bytes unless the object already exists. Content addressing makes
    /// concurrent writers of the same id produce identical files.
    async fn write_object(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if fs::try_exists(path).await? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Temp file with unique name, fsync, then rename
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CommitStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn load_commit(&self, store_id: StoreId, commit_id: ObjectId) -> StorageResult<Commit> {
        let path = self.object_path(store_id, COMMITS_DIR, commit_id);
        let bytes = self
            .read_object(&path, format!("commit {commit_id} in store {store_id}"))
            .await?;
        let commit = Commit::from_bytes(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("commit {commit_id}: {e}")))?;
        if commit.commit_id != commit_id || !commit.verify() {
            return Err(StorageError::Corrupt(format!(
                "commit {commit_id}: content does not match id"
            )));
        }
        Ok(commit)
    }

    #[instrument(skip(self, commit), fields(backend = "filesystem", commit_id = %commit.commit_id))]
    async fn put_commit(&self, store_id: StoreId, commit: &Commit) -> StorageResult<()> {
        if !commit.verify() {
            return Err(StorageError::Corrupt(format!(
                "refusing to write commit {} with mismatched id",
                commit.commit_id
            )));
        }
        let path = self.object_path(store_id, COMMITS_DIR, commit.commit_id);
        self.write_object(&path, &commit.to_bytes()?).await
    }
}

#[async_trait]
impl DirStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn load_dir(&self, store_id: StoreId, dir_id: ObjectId) -> StorageResult<Dir> {
        if dir_id.is_empty_dir() {
            return Ok(Dir::empty());
        }
        let path = self.object_path(store_id, FS_DIR, dir_id);
        let bytes = self
            .read_object(&path, format!("dir {dir_id} in store {store_id}"))
            .await?;
        let dir = Dir::from_bytes(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("dir {dir_id}: {e}")))?;
        if dir.id() != dir_id {
            return Err(StorageError::Corrupt(format!(
                "dir {dir_id}: content does not match id"
            )));
        }
        Ok(dir)
    }

    #[instrument(skip(self, dir), fields(backend = "filesystem", entries = dir.entries().len()))]
    async fn put_dir(&self, store_id: StoreId, dir: &Dir) -> StorageResult<ObjectId> {
        let id = dir.id();
        if id.is_empty_dir() {
            return Ok(id);
        }
        let path = self.object_path(store_id, FS_DIR, id);
        self.write_object(&path, &dir.to_bytes()?).await?;
        Ok(id)
    }
}

#[async_trait]
impl TreeCounter for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn count_tree(
        &self,
        store_id: StoreId,
        root_id: ObjectId,
        path: &str,
    ) -> StorageResult<SizeInfo> {
        walk::count_tree(self, store_id, root_id, path).await
    }
}

#[async_trait]
impl DiffProvider for FilesystemBackend {
    #[instrument(skip(self, old, new), fields(backend = "filesystem", old = %old.commit_id, new = %new.commit_id))]
    async fn diff_commits(
        &self,
        store_id: StoreId,
        old: &Commit,
        new: &Commit,
    ) -> StorageResult<Vec<ChangeEntry>> {
        walk::diff_trees(self, store_id, old.root_id, new.root_id).await
    }
}

impl ObjectStore for FilesystemBackend {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
