use reposize_core::{Commit, ObjectId, RepoId, StoreId};
use reposize_storage::{CommitStore, FilesystemBackend, StorageResult, TreeBuilder};
use tempfile::TempDir;

/// Deterministic content id for a test file.
pub fn content_id(seed: &str) -> ObjectId {
    ObjectId::compute(seed.as_bytes())
}

/// A filesystem backend in a temporary directory with one repository store.
pub struct TestStore {
    pub backend: FilesystemBackend,
    pub repo_id: RepoId,
    pub store_id: StoreId,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path())
            .await
            .expect("Failed to create backend");
        let repo_id = RepoId::new();
        Self {
            backend,
            repo_id,
            store_id: StoreId::from(repo_id),
            _temp_dir: temp_dir,
        }
    }

    /// Write a tree of `(path, size)` files and return its root id.
    /// File content ids are derived from path and size.
    pub async fn tree(&self, files: &[(&str, i64)]) -> StorageResult<ObjectId> {
        let mut builder = TreeBuilder::new();
        for (path, size) in files {
            builder.add_file(path, content_id(&format!("{path}:{size}")), *size)?;
        }
        builder.write(&self.backend, self.store_id).await
    }

    /// Write a commit pointing at `root_id`.
    pub async fn commit(
        &self,
        root_id: ObjectId,
        parent: Option<&Commit>,
        ctime: i64,
    ) -> StorageResult<Commit> {
        let commit = Commit::new(
            self.repo_id,
            root_id,
            parent.map(|p| p.commit_id),
            "tester",
            format!("commit at {ctime}"),
            ctime,
        );
        self.backend.put_commit(self.store_id, &commit).await?;
        Ok(commit)
    }
}
