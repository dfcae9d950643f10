//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{RegistryRepo, RepoSizeRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use reposize_core::config::PgSslMode;
use reposize_core::{ObjectId, RepoId, RepoSizeInfo, Repository};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// The password can then come from its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Internal: Connect to PostgreSQL with the given options.
    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        // Bounds each recomputation's database round-trips.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold a single statement each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryRepo for PostgresStore {
    async fn get_repository(&self, repo_id: RepoId) -> MetadataResult<Option<Repository>> {
        let row = sqlx::query_as::<_, RepoRow>("SELECT * FROM repos WHERE repo_id = $1")
            .bind(repo_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RepoRow::into_repository).transpose()
    }

    async fn set_repository_head(&self, repo: &Repository) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO repos (repo_id, store_id, head_commit_id, root_id, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(repo_id) DO UPDATE SET
                store_id = EXCLUDED.store_id,
                head_commit_id = EXCLUDED.head_commit_id,
                root_id = EXCLUDED.root_id,
                updated_at = EXCLUDED.updated_at
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
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(RepoId::from_uuid).collect())
    }
}

#[async_trait]
impl RepoSizeRepo for PostgresStore {
    async fn get_previous_size_info(
        &self,
        repo_id: RepoId,
    ) -> MetadataResult<Option<RepoSizeInfo>> {
        let row = sqlx::query_as::<_, RepoSizeInfoRow>(
            r#"
            SELECT s.head_id, s.size, c.file_count
            FROM repo_size s
            JOIN repo_file_count c ON c.repo_id = s.repo_id
            WHERE s.repo_id = $1
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(repo_id) DO UPDATE SET
                size = EXCLUDED.size,
                head_id = EXCLUDED.head_id,
                updated_at = EXCLUDED.updated_at
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
            VALUES ($1, $2)
            ON CONFLICT(repo_id) DO UPDATE SET
                file_count = EXCLUDED.file_count
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
        let size = sqlx::query_scalar("SELECT size FROM repo_size WHERE repo_id = $1")
            .bind(repo_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(size)
    }

    async fn get_repo_file_count(&self, repo_id: RepoId) -> MetadataResult<Option<i64>> {
        let count = sqlx::query_scalar("SELECT file_count FROM repo_file_count WHERE repo_id = $1")
            .bind(repo_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_size_record(&self, repo_id: RepoId) -> MetadataResult<Option<RepoSizeRow>> {
        let row = sqlx::query_as::<_, RepoSizeRow>("SELECT * FROM repo_size WHERE repo_id = $1")
            .bind(repo_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
