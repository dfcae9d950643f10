//! Collaborator wrappers with failure injection and call counters.

use async_trait::async_trait;
use reposize_core::{
    ChangeEntry, Commit, Dir, ObjectId, RepoId, RepoSizeInfo, Repository, SizeInfo, StoreId,
};
use reposize_metadata::models::RepoSizeRow;
use reposize_metadata::repos::{RegistryRepo, RepoSizeRepo};
use reposize_metadata::{MetadataError, MetadataResult, MetadataStore, SqliteStore};
use reposize_storage::{
    CommitStore, DiffProvider, DirStore, FilesystemBackend, ObjectStore, StorageError,
    StorageResult, TreeCounter,
};
use reposize_worker::{ComputationError, JobHandler, SizeError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Filesystem object store that can be told to fail.
#[allow(dead_code)]
pub struct FaultyObjects {
    inner: FilesystemBackend,
    missing_commits: Mutex<HashSet<ObjectId>>,
    pub fail_diff: AtomicBool,
    pub fail_count: AtomicBool,
    pub commit_loads: AtomicUsize,
    pub diff_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyObjects {
    pub fn new(inner: FilesystemBackend) -> Self {
        Self {
            inner,
            missing_commits: Mutex::new(HashSet::new()),
            fail_diff: AtomicBool::new(false),
            fail_count: AtomicBool::new(false),
            commit_loads: AtomicUsize::new(0),
            diff_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
        }
    }

    /// The wrapped backend, bypassing fault injection and counters.
    pub fn inner(&self) -> &FilesystemBackend {
        &self.inner
    }

    /// Make loads of `commit_id` fail as if the object were missing.
    pub fn hide_commit(&self, commit_id: ObjectId) {
        self.missing_commits.lock().unwrap().insert(commit_id);
    }

    pub fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitStore for FaultyObjects {
    async fn load_commit(&self, store_id: StoreId, commit_id: ObjectId) -> StorageResult<Commit> {
        self.commit_loads.fetch_add(1, Ordering::SeqCst);
        if self.missing_commits.lock().unwrap().contains(&commit_id) {
            return Err(StorageError::NotFound(format!("commit {commit_id}")));
        }
        self.inner.load_commit(store_id, commit_id).await
    }

    async fn put_commit(&self, store_id: StoreId, commit: &Commit) -> StorageResult<()> {
        self.inner.put_commit(store_id, commit).await
    }
}

#[async_trait]
impl DirStore for FaultyObjects {
    async fn load_dir(&self, store_id: StoreId, dir_id: ObjectId) -> StorageResult<Dir> {
        self.inner.load_dir(store_id, dir_id).await
    }

    async fn put_dir(&self, store_id: StoreId, dir: &Dir) -> StorageResult<ObjectId> {
        self.inner.put_dir(store_id, dir).await
    }
}

#[async_trait]
impl TreeCounter for FaultyObjects {
    async fn count_tree(
        &self,
        store_id: StoreId,
        root_id: ObjectId,
        path: &str,
    ) -> StorageResult<SizeInfo> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupt(format!("tree {root_id}")));
        }
        self.inner.count_tree(store_id, root_id, path).await
    }
}

#[async_trait]
impl DiffProvider for FaultyObjects {
    async fn diff_commits(
        &self,
        store_id: StoreId,
        old: &Commit,
        new: &Commit,
    ) -> StorageResult<Vec<ChangeEntry>> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_diff.load(Ordering::SeqCst) {
            return Err(StorageError::Corrupt(format!("tree {}", old.root_id)));
        }
        self.inner.diff_commits(store_id, old, new).await
    }
}

impl ObjectStore for FaultyObjects {
    fn backend_name(&self) -> &'static str {
        "faulty-filesystem"
    }
}

/// SQLite metadata store that counts size writes and can be told to fail.
#[allow(dead_code)]
pub struct CountingMetadata {
    inner: SqliteStore,
    pub size_writes: AtomicUsize,
    pub fail_lookup: AtomicBool,
    pub fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl CountingMetadata {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            size_writes: AtomicUsize::new(0),
            fail_lookup: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn size_writes(&self) -> usize {
        self.size_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryRepo for CountingMetadata {
    async fn get_repository(&self, repo_id: RepoId) -> MetadataResult<Option<Repository>> {
        self.inner.get_repository(repo_id).await
    }

    async fn set_repository_head(&self, repo: &Repository) -> MetadataResult<()> {
        self.inner.set_repository_head(repo).await
    }

    async fn list_stale_repositories(&self, limit: u32) -> MetadataResult<Vec<RepoId>> {
        self.inner.list_stale_repositories(limit).await
    }
}

#[async_trait]
impl RepoSizeRepo for CountingMetadata {
    async fn get_previous_size_info(
        &self,
        repo_id: RepoId,
    ) -> MetadataResult<Option<RepoSizeInfo>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(MetadataError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.get_previous_size_info(repo_id).await
    }

    async fn set_repo_size_and_file_count(
        &self,
        repo_id: RepoId,
        head_id: &ObjectId,
        size: i64,
        file_count: i64,
    ) -> MetadataResult<()> {
        self.size_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetadataError::TransactionStart(sqlx::Error::PoolTimedOut));
        }
        self.inner
            .set_repo_size_and_file_count(repo_id, head_id, size, file_count)
            .await
    }

    async fn get_repo_size(&self, repo_id: RepoId) -> MetadataResult<Option<i64>> {
        self.inner.get_repo_size(repo_id).await
    }

    async fn get_repo_file_count(&self, repo_id: RepoId) -> MetadataResult<Option<i64>> {
        self.inner.get_repo_file_count(repo_id).await
    }

    async fn get_size_record(&self, repo_id: RepoId) -> MetadataResult<Option<RepoSizeRow>> {
        self.inner.get_size_record(repo_id).await
    }
}

#[async_trait]
impl MetadataStore for CountingMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}

/// What a [`RecordingHandler`] does for a repository.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Sleep(Duration),
    /// Block until [`RecordingHandler::open_gate`] is called.
    Gate,
}

/// Job handler that records calls and concurrency.
#[allow(dead_code)]
pub struct RecordingHandler {
    behaviors: Mutex<HashMap<RepoId, Behavior>>,
    calls: Mutex<HashMap<RepoId, usize>>,
    active: Mutex<HashMap<RepoId, usize>>,
    pub max_active_per_repo: AtomicUsize,
    pub total_active: AtomicUsize,
    pub max_total_active: AtomicUsize,
    pub started: Notify,
    gate: Notify,
    gate_open: AtomicBool,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            max_active_per_repo: AtomicUsize::new(0),
            total_active: AtomicUsize::new(0),
            max_total_active: AtomicUsize::new(0),
            started: Notify::new(),
            gate: Notify::new(),
            gate_open: AtomicBool::new(false),
        }
    }

    pub fn set_behavior(&self, repo_id: RepoId, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(repo_id, behavior);
    }

    pub fn calls(&self, repo_id: RepoId) -> usize {
        self.calls.lock().unwrap().get(&repo_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn open_gate(&self) {
        self.gate_open.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    fn enter(&self, repo_id: RepoId) {
        *self.calls.lock().unwrap().entry(repo_id).or_insert(0) += 1;
        let now = {
            let mut active = self.active.lock().unwrap();
            let count = active.entry(repo_id).or_insert(0);
            *count += 1;
            *count
        };
        self.max_active_per_repo.fetch_max(now, Ordering::SeqCst);
        let total = self.total_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total_active.fetch_max(total, Ordering::SeqCst);
        self.started.notify_one();
    }

    fn leave(&self, repo_id: RepoId) {
        if let Some(count) = self.active.lock().unwrap().get_mut(&repo_id) {
            *count -= 1;
        }
        self.total_active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn wait_for_gate(&self) {
        loop {
            let notified = self.gate.notified();
            if self.gate_open.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, repo_id: RepoId) -> Result<(), ComputationError> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&repo_id)
            .copied()
            .unwrap_or(Behavior::Succeed);

        self.enter(repo_id);
        let result = match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ComputationError::new(repo_id, SizeError::RepositoryNotFound)),
            Behavior::Panic => {
                self.leave(repo_id);
                panic!("handler panicked for {repo_id}");
            }
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Behavior::Gate => {
                self.wait_for_gate().await;
                Ok(())
            }
        };
        self.leave(repo_id);
        result
    }
}
