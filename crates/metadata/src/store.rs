//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{RegistryRepo, RepoSizeRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: RegistryRepo + RepoSizeRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if needed.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // SQLite has no statement timeout; the configured value bounds how long
        // a writer waits on the database lock instead.
        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(5));

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // Single writer connection avoids "database is locked" under
            // concurrent workers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "Opened SQLite metadata store");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use reposize_core::{ObjectId, RepoId, RepoSizeInfo, Repository};
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl RegistryRepo for SqliteStore {
        async fn get_repository(&self, repo_id: RepoId) -> MetadataResult<Option<Repository>> {
            let row = sqlx::query_as::<_, RepoRow>("SELECT * FROM repos WHERE repo_id = ?")
                .bind(repo_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            row.map(RepoRow::into_repository).transpose()
        }

        async fn set_repository_head(&self, repo: &Repository) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO repos (repo_id, store_id, head_commit_id, root_id, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(repo_id) DO UPDATE SET
                    store_id = excluded.store_id,
                    head_commit_id = excluded.head_commit_id,
                    root_id = excluded.root_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(repo.repo_id.as_uuid())
            .bind(repo.store_id.as_uuid())
            .bind(repo.head_commit_id.to_hex())
            .bind(repo.root_id.to_hex())
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await
            .map_err(MetadataError::from_write)?;
            Ok(())
        }

        async fn list_stale_repositories(&self, limit: u32) -> MetadataResult<Vec<RepoId>> {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                r#"
                SELECT r.repo_id FROM repos r
                LEFT JOIN repo_size s ON s.repo_id = r.repo_id
                WHERE s.repo_id IS NULL OR s.head_id <> r.head_commit_id
                ORDER BY r.updated_at, r.repo_id
                LIMIT ?
                "#,
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(ids.into_iter().map(RepoId::from_uuid).collect())
        }
    }

    #[async_trait]
    impl RepoSizeRepo for SqliteStore {
        async fn get_previous_size_info(
            &self,
            repo_id: RepoId,
        ) -> MetadataResult<Option<RepoSizeInfo>> {
            let row = sqlx::query_as::<_, RepoSizeInfoRow>(
                r#"
                SELECT s.head_id, s.size, c.file_count
                FROM repo_size s
                JOIN repo_file_count c ON c.repo_id = s.repo_id
                WHERE s.repo_id = ?
                "#,
            )
            .bind(repo_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.map(RepoSizeInfoRow::into_info).transpose()
        }

        async fn set_repo_size_and_file_count(
            &self,
            repo_id: RepoId,
            head_id: &ObjectId,
            size: i64,
            file_count: i64,
        ) -> MetadataResult<()> {
            let now = OffsetDateTime::now_utc();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(MetadataError::TransactionStart)?;

            sqlx::query(
                r#"
                INSERT INTO repo_size (repo_id, size, head_id, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(repo_id) DO UPDATE SET
                    size = excluded.size,
                    head_id = excluded.head_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(repo_id.as_uuid())
            .bind(size)
            .bind(head_id.to_hex())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(MetadataError::from_write)?;

            sqlx::query(
                r#"
                INSERT INTO repo_file_count (repo_id, file_count)
                VALUES (?, ?)
                ON CONFLICT(repo_id) DO UPDATE SET
                    file_count = excluded.file_count
                "#,
            )
            .bind(repo_id.as_uuid())
            .bind(file_count)
            .execute(&mut *tx)
            .await
            .map_err(MetadataError::from_write)?;

            tx.commit()
                .await
                .map_err(MetadataError::TransactionCommit)?;
            Ok(())
        }

        async fn get_repo_size(&self, repo_id: RepoId) -> MetadataResult<Option<i64>> {
            let size = sqlx::query_scalar("SELECT size FROM repo_size WHERE repo_id = ?")
                .bind(repo_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(size)
        }

        async fn get_repo_file_count(&self, repo_id: RepoId) -> MetadataResult<Option<i64>> {
            let count =
                sqlx::query_scalar("SELECT file_count FROM repo_file_count WHERE repo_id = ?")
                    .bind(repo_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(count)
        }

        async fn get_size_record(&self, repo_id: RepoId) -> MetadataResult<Option<RepoSizeRow>> {
            let row = sqlx::query_as::<_, RepoSizeRow>("SELECT * FROM repo_size WHERE repo_id = ?")
                .bind(repo_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Repository registry: live head per repository
CREATE TABLE IF NOT EXISTS repos (
    repo_id BLOB PRIMARY KEY,
    store_id BLOB NOT NULL,
    head_commit_id TEXT NOT NULL,
    root_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_repos_updated ON repos(updated_at);

-- Cumulative size and the head it was computed at
CREATE TABLE IF NOT EXISTS repo_size (
    repo_id BLOB PRIMARY KEY,
    size INTEGER NOT NULL CHECK (size >= 0),
    head_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Cumulative file count, written together with repo_size
CREATE TABLE IF NOT EXISTS repo_file_count (
    repo_id BLOB PRIMARY KEY,
    file_count INTEGER NOT NULL CHECK (file_count >= 0)
);
"#;
