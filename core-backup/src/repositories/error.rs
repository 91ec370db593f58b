use async_trait::async_trait;
use bridge_traits::FolderId;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{PipelineError, Result};
use crate::models::{BackupError, BackupErrorKind};

/// Persistence of recorded backup failures.
#[async_trait]
pub trait BackupErrorRepository: Send + Sync {
    /// Record a failure; returns the stored row
    async fn record(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
        kind: BackupErrorKind,
        retryable: bool,
        message: &str,
        created_at: i64,
    ) -> Result<BackupError>;

    /// Errors affecting a folder: its own plus the user-wide ones
    async fn find_for_folder(&self, user_id: &str, folder_id: &FolderId)
        -> Result<Vec<BackupError>>;

    /// User-wide errors only
    async fn find_for_user(&self, user_id: &str) -> Result<Vec<BackupError>>;

    async fn clear_folder(&self, folder_id: &FolderId) -> Result<u64>;

    async fn clear_user(&self, user_id: &str) -> Result<u64>;
}

pub struct SqliteBackupErrorRepository {
    pool: SqlitePool,
}

impl SqliteBackupErrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<BackupError> {
        let share_id: Option<String> = row.get("share_id");
        let link_id: Option<String> = row.get("link_id");

        Ok(BackupError {
            id: row.get("id"),
            user_id: row.get("user_id"),
            folder_id: share_id.zip(link_id).map(|(s, l)| FolderId::new(s, l)),
            kind: row.get::<String, _>("kind").parse()?,
            retryable: row.get("retryable"),
            message: row.get("message"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl BackupErrorRepository for SqliteBackupErrorRepository {
    async fn record(
        &self,
        user_id: &str,
        folder_id: Option<&FolderId>,
        kind: BackupErrorKind,
        retryable: bool,
        message: &str,
        created_at: i64,
    ) -> Result<BackupError> {
        let result = sqlx::query(
            r#"
            INSERT INTO backup_errors (user_id, share_id, link_id, kind, retryable, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(folder_id.map(|f| f.share_id.as_str()))
        .bind(folder_id.map(|f| f.link_id.as_str()))
        .bind(kind.as_str())
        .bind(retryable)
        .bind(message)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(BackupError {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            folder_id: folder_id.cloned(),
            kind,
            retryable,
            message: message.to_string(),
            created_at,
        })
    }

    async fn find_for_folder(
        &self,
        user_id: &str,
        folder_id: &FolderId,
    ) -> Result<Vec<BackupError>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, share_id, link_id, kind, retryable, message, created_at
            FROM backup_errors
            WHERE (share_id = ? AND link_id = ?)
               OR (user_id = ? AND share_id IS NULL)
            ORDER BY id
            "#,
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn find_for_user(&self, user_id: &str) -> Result<Vec<BackupError>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, share_id, link_id, kind, retryable, message, created_at
            FROM backup_errors
            WHERE user_id = ? AND share_id IS NULL
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn clear_folder(&self, folder_id: &FolderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backup_errors WHERE share_id = ? AND link_id = ?")
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn clear_user(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backup_errors WHERE user_id = ? AND share_id IS NULL")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
