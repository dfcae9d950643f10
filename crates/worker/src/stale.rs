//! Stale repository backfill.
//!
//! A repository is stale when its size record is missing or was computed at a
//! head other than the live one. Failed jobs are not retried, so the daemon
//! sweeps stale repositories on start and, optionally, on an interval.

use crate::error::SchedulerError;
use crate::scheduler::SizeScheduler;
use reposize_metadata::repos::RegistryRepo;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Queue up to `batch` stale repositories. Returns how many were requested.
pub async fn enqueue_stale_repositories<R>(
    registry: &R,
    scheduler: &SizeScheduler,
    batch: u32,
) -> Result<usize, SchedulerError>
where
    R: RegistryRepo + ?Sized,
{
    let stale = registry
        .list_stale_repositories(batch)
        .await
        .map_err(SchedulerError::StaleListing)?;

    if stale.is_empty() {
        tracing::debug!("No stale repositories");
        return Ok(0);
    }

    tracing::info!(count = stale.len(), "Queueing stale repositories");
    for repo_id in &stale {
        scheduler.request_size_update(*repo_id).await?;
    }
    Ok(stale.len())
}

/// Rescan for stale repositories every `interval` until the scheduler shuts down.
pub fn spawn_stale_scan<R>(
    registry: Arc<R>,
    scheduler: Arc<SizeScheduler>,
    interval: Duration,
    batch: u32,
) -> JoinHandle<()>
where
    R: RegistryRepo + ?Sized + 'static,
{
    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Stale repository scan enabled");
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately; startup backfill covers it.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match enqueue_stale_repositories(registry.as_ref(), &scheduler, batch).await {
                Ok(_) => {}
                Err(SchedulerError::ShutDown) => break,
                Err(e) => tracing::warn!(error = %e, "Stale repository scan failed"),
            }
        }

        tracing::debug!("Stale repository scan stopped");
    })
}
