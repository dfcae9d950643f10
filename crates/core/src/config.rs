//! Configuration types shared across crates.
//!
//! Loaded by the daemon through figment: an optional TOML file merged with
//! `REPOSIZE_`-prefixed environment variables (`__` separates nested keys).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds. Advisory only: SQLite cannot cancel a running statement.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer REPOSIZE_METADATA__PASSWORD over storing this in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds; PostgreSQL cancels queries exceeding it.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/reposize.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be at least 1".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Object store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per store id.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/objects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Size recomputation scheduler configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Pending jobs accepted before `request_size_update` waits for space.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on one recomputation, in seconds. 0 disables the limit.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Interval between scans for stale repositories, in seconds. 0 disables scanning.
    #[serde(default)]
    pub stale_scan_interval_secs: u64,
    /// Maximum repositories enqueued per stale scan.
    #[serde(default = "default_stale_scan_batch")]
    pub stale_scan_batch: u32,
    /// Enqueue every stale repository when the daemon starts.
    #[serde(default = "default_backfill_on_start")]
    pub backfill_on_start: bool,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    10
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_stale_scan_batch() -> u32 {
    1000
}

fn default_backfill_on_start() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            job_timeout_secs: default_job_timeout_secs(),
            stale_scan_interval_secs: 0,
            stale_scan_batch: default_stale_scan_batch(),
            backfill_on_start: default_backfill_on_start(),
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("scheduler.workers must be at least 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("scheduler.queue_capacity must be at least 1".to_string());
        }
        if self.stale_scan_batch == 0 {
            return Err("scheduler.stale_scan_batch must be at least 1".to_string());
        }
        Ok(())
    }

    /// Per-job time limit, if any.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Interval between stale scans, if enabled.
    pub fn stale_scan_interval(&self) -> Option<Duration> {
        (self.stale_scan_interval_secs > 0)
            .then(|| Duration::from_secs(self.stale_scan_interval_secs))
    }
}

/// Complete daemon configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Object store configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.scheduler.validate()
    }

    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.** SQLite metadata and a small scheduler.
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            metadata: MetadataConfig::Sqlite {
                path: dir.join("reposize.db"),
                query_timeout_secs: None,
            },
            storage: StorageConfig {
                path: dir.join("objects"),
            },
            scheduler: SchedulerConfig {
                workers: 2,
                queue_capacity: 4,
                job_timeout_secs: 30,
                backfill_on_start: false,
                ..SchedulerConfig::default()
            },
        }
    }
}
