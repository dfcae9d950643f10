//! Per-repository exclusion.

use dashmap::DashMap;
use reposize_core::RepoId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of async mutexes keyed by repository.
///
/// Entries are created on first use and removed when the last holder releases,
/// so the map only holds repositories with a job in flight or waiting.
///
/// Pruning happens only when a guard drops. A waiter cancelled after the
/// previous holder released leaves its entry behind until the next
/// lock/unlock of that repository.
#[derive(Clone, Default)]
pub struct RepoLocks {
    locks: Arc<DashMap<RepoId, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder has `repo_id`, then hold it until the guard drops.
    pub async fn lock(&self, repo_id: RepoId) -> RepoGuard {
        // Clone out of the map so the shard lock is not held across the await.
        let mutex = self
            .locks
            .entry(repo_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        RepoGuard {
            repo_id,
            locks: self.clone(),
            _guard: guard,
        }
    }

    /// Number of repositories currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one repository.
pub struct RepoGuard {
    repo_id: RepoId,
    locks: RepoLocks,
    _guard: OwnedMutexGuard<()>,
}

impl RepoGuard {
    pub fn repo_id(&self) -> RepoId {
        self.repo_id
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        // Two references remain when nobody else waits: the map's and our guard's.
        self.locks
            .locks
            .remove_if(&self.repo_id, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}
