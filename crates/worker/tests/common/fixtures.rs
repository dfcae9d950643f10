//! Repository fixtures over real stores in a temporary directory.

use super::mocks::{CountingMetadata, FaultyObjects};
use reposize_core::{
    Commit, ObjectId, ROOT_PATH, RepoId, RepoSizeInfo, Repository, SizeInfo, StoreId,
};
use reposize_metadata::SqliteStore;
use reposize_metadata::repos::{RegistryRepo, RepoSizeRepo};
use reposize_storage::{CommitStore, FilesystemBackend, TreeBuilder, TreeCounter};
use reposize_worker::SizeAccountant;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Deterministic content id for a test file.
pub fn content_id(path: &str, size: i64) -> ObjectId {
    ObjectId::compute(format!("{path}:{size}").as_bytes())
}

/// Object store, metadata store and accountant sharing one temp directory.
#[allow(dead_code)]
pub struct TestWorld {
    pub objects: Arc<FaultyObjects>,
    pub metadata: Arc<CountingMetadata>,
    pub accountant: SizeAccountant,
    clock: AtomicI64,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestWorld {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path().join("objects"))
            .await
            .expect("Failed to create object store");
        let sqlite = SqliteStore::new(temp_dir.path().join("metadata.db"), None)
            .await
            .expect("Failed to create metadata store");

        let objects = Arc::new(FaultyObjects::new(backend));
        let metadata = Arc::new(CountingMetadata::new(sqlite));
        let accountant = SizeAccountant::new(metadata.clone(), objects.clone());

        Self {
            objects,
            metadata,
            accountant,
            clock: AtomicI64::new(1_700_000_000),
            _temp_dir: temp_dir,
        }
    }

    /// Write a commit of `files` on top of `parent` without moving any head.
    pub async fn commit(
        &self,
        repo_id: RepoId,
        files: &[(&str, i64)],
        parent: Option<&Commit>,
    ) -> Commit {
        let store_id = StoreId::from(repo_id);
        let mut builder = TreeBuilder::new();
        for (path, size) in files {
            builder
                .add_file(path, content_id(path, *size), *size)
                .expect("Failed to add file");
        }
        let root_id = builder
            .write(self.objects.as_ref(), store_id)
            .await
            .expect("Failed to write tree");

        let ctime = self.clock.fetch_add(1, Ordering::SeqCst);
        let commit = Commit::new(
            repo_id,
            root_id,
            parent.map(|p| p.commit_id),
            "tester",
            format!("commit at {ctime}"),
            ctime,
        );
        self.objects
            .put_commit(store_id, &commit)
            .await
            .expect("Failed to write commit");
        commit
    }

    /// Point the registry head of `repo_id` at `commit`.
    pub async fn set_head(&self, repo_id: RepoId, commit: &Commit) {
        let repo = Repository {
            repo_id,
            store_id: StoreId::from(repo_id),
            head_commit_id: commit.commit_id,
            root_id: commit.root_id,
        };
        self.metadata
            .set_repository_head(&repo)
            .await
            .expect("Failed to set head");
    }

    /// Commit `files` and advance the head to it.
    pub async fn push(
        &self,
        repo_id: RepoId,
        files: &[(&str, i64)],
        parent: Option<&Commit>,
    ) -> Commit {
        let commit = self.commit(repo_id, files, parent).await;
        self.set_head(repo_id, &commit).await;
        commit
    }

    /// Ground-truth totals of a commit by full walk. Not counted in
    /// [`FaultyObjects::count_calls`].
    pub async fn full_walk(&self, repo_id: RepoId, commit: &Commit) -> SizeInfo {
        self.objects
            .inner()
            .count_tree(StoreId::from(repo_id), commit.root_id, ROOT_PATH)
            .await
            .expect("Failed to count tree")
    }

    pub async fn record(&self, repo_id: RepoId) -> Option<RepoSizeInfo> {
        self.metadata
            .get_previous_size_info(repo_id)
            .await
            .expect("Failed to read size record")
    }
}

/// Poll `check` until it returns true, failing the test after five seconds.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
