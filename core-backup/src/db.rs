//! # Database Connection Pool Module
//!
//! SQLite pool and schema for the backup records.
//!
//! ## Features
//!
//! - **WAL Mode**: status readers never block pipeline writers
//! - **Schema bootstrap**: tables are created on pool creation
//! - **Health Checks**: connection validated before the pool is returned
//!
//! ## Testing
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::{PipelineError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS backup_folders (
        user_id TEXT NOT NULL,
        bucket_id INTEGER NOT NULL,
        share_id TEXT NOT NULL,
        link_id TEXT NOT NULL,
        update_time INTEGER,
        enabled INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (user_id, bucket_id, share_id, link_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backup_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        bucket_id INTEGER NOT NULL,
        share_id TEXT NOT NULL,
        link_id TEXT NOT NULL,
        uri TEXT NOT NULL,
        name TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        hash TEXT NOT NULL,
        size INTEGER NOT NULL,
        capture_time INTEGER NOT NULL,
        state TEXT NOT NULL,
        upload_priority INTEGER NOT NULL,
        draft_link_id TEXT,
        UNIQUE (share_id, link_id, uri)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_backup_files_folder_state
    ON backup_files(share_id, link_id, bucket_id, state)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_backup_files_schedule
    ON backup_files(state, upload_priority ASC, id ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backup_duplicates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        share_id TEXT NOT NULL,
        link_id TEXT NOT NULL,
        hash TEXT NOT NULL,
        content_hash TEXT,
        remote_link_id TEXT,
        link_state TEXT,
        revision_id TEXT,
        client_uid TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_backup_duplicates_hash
    ON backup_duplicates(share_id, link_id, hash)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS backup_errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        share_id TEXT,
        link_id TEXT,
        kind TEXT NOT NULL,
        retryable INTEGER NOT NULL,
        message TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
];

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL, `sqlite::memory:` for an in-memory database
    pub database_url: String,

    pub min_connections: u32,

    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum idle time before a connection is closed
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Create a configuration for a database file
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Create a configuration for an in-memory database
    ///
    /// Every SQLite in-memory connection is a separate database, so the pool
    /// is limited to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool with the backup schema applied
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating backup database pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| PipelineError::Database(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            PipelineError::Database(e.to_string())
        })?;

    initialize_schema(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied, for tests
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;
    }

    debug!(statements = SCHEMA.len(), "Backup schema ready");
    Ok(())
}

async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        PipelineError::Database(e.to_string())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await;
        assert!(pool.is_ok(), "Should create test pool successfully");
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'backup_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("/data/backup.db")
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5));

        assert_eq!(config.database_url, "sqlite:/data/backup.db");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(DatabaseConfig::default().max_connections, 1);
    }
}
