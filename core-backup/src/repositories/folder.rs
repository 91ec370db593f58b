use async_trait::async_trait;
use bridge_traits::FolderId;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{PipelineError, Result};
use crate::models::BackupFolder;

/// Persistence of [`BackupFolder`] pairings.
#[async_trait]
pub trait BackupFolderRepository: Send + Sync {
    /// Insert a pairing, or flip `enabled` on an existing one keeping its watermark
    async fn upsert(&self, folder: &BackupFolder) -> Result<()>;

    async fn find(
        &self,
        user_id: &str,
        bucket_id: i64,
        folder_id: &FolderId,
    ) -> Result<Option<BackupFolder>>;

    /// All buckets paired with a remote folder
    async fn find_by_folder(&self, folder_id: &FolderId) -> Result<Vec<BackupFolder>>;

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<BackupFolder>>;

    /// Advance the watermark. Never moves it backward; returns whether it changed.
    async fn advance_watermark(&self, folder: &BackupFolder, update_time: i64) -> Result<bool>;

    /// Set the enabled flag on every bucket of a remote folder
    async fn set_enabled(&self, folder_id: &FolderId, enabled: bool) -> Result<u64>;

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64>;
}

pub struct SqliteBackupFolderRepository {
    pool: SqlitePool,
}

impl SqliteBackupFolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> BackupFolder {
        BackupFolder {
            user_id: row.get("user_id"),
            bucket_id: row.get("bucket_id"),
            folder_id: FolderId::new(
                row.get::<String, _>("share_id"),
                row.get::<String, _>("link_id"),
            ),
            update_time: row.get("update_time"),
            enabled: row.get("enabled"),
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT user_id, bucket_id, share_id, link_id, update_time, enabled FROM backup_folders";

#[async_trait]
impl BackupFolderRepository for SqliteBackupFolderRepository {
    async fn upsert(&self, folder: &BackupFolder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backup_folders (user_id, bucket_id, share_id, link_id, update_time, enabled)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, bucket_id, share_id, link_id)
            DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(&folder.user_id)
        .bind(folder.bucket_id)
        .bind(&folder.folder_id.share_id)
        .bind(&folder.folder_id.link_id)
        .bind(folder.update_time)
        .bind(folder.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find(
        &self,
        user_id: &str,
        bucket_id: i64,
        folder_id: &FolderId,
    ) -> Result<Option<BackupFolder>> {
        let row = sqlx::query(&format!(
            "{} WHERE user_id = ? AND bucket_id = ? AND share_id = ? AND link_id = ?",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(bucket_id)
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(row.as_ref().map(Self::from_row))
    }

    async fn find_by_folder(&self, folder_id: &FolderId) -> Result<Vec<BackupFolder>> {
        let rows = sqlx::query(&format!(
            "{} WHERE share_id = ? AND link_id = ? ORDER BY bucket_id",
            SELECT_COLUMNS
        ))
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::from_row).collect())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<BackupFolder>> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? ORDER BY share_id, link_id, bucket_id",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::from_row).collect())
    }

    async fn advance_watermark(&self, folder: &BackupFolder, update_time: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE backup_folders SET update_time = ?
            WHERE user_id = ? AND bucket_id = ? AND share_id = ? AND link_id = ?
              AND (update_time IS NULL OR update_time < ?)
            "#,
        )
        .bind(update_time)
        .bind(&folder.user_id)
        .bind(folder.bucket_id)
        .bind(&folder.folder_id.share_id)
        .bind(&folder.folder_id.link_id)
        .bind(update_time)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_enabled(&self, folder_id: &FolderId, enabled: bool) -> Result<u64> {
        let result =
            sqlx::query("UPDATE backup_folders SET enabled = ? WHERE share_id = ? AND link_id = ?")
                .bind(enabled)
                .bind(&folder_id.share_id)
                .bind(&folder_id.link_id)
                .execute(&self.pool)
                .await
                .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backup_folders WHERE share_id = ? AND link_id = ?")
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
