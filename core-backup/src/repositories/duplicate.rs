use async_trait::async_trait;
use bridge_traits::{FolderId, LinkState};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{PipelineError, Result};
use crate::models::BackupDuplicate;

/// Persistence of name-hash collisions between the first and second dedup phase.
#[async_trait]
pub trait BackupDuplicateRepository: Send + Sync {
    /// Replace every duplicate recorded for `hash` in one transaction
    async fn replace_for_hash(
        &self,
        folder_id: &FolderId,
        hash: &str,
        duplicates: &[BackupDuplicate],
    ) -> Result<()>;

    async fn find_by_hash(&self, folder_id: &FolderId, hash: &str) -> Result<Vec<BackupDuplicate>>;

    async fn delete_by_hash(&self, folder_id: &FolderId, hash: &str) -> Result<u64>;

    async fn count(&self, folder_id: &FolderId) -> Result<u64>;

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64>;
}

pub struct SqliteBackupDuplicateRepository {
    pool: SqlitePool,
}

impl SqliteBackupDuplicateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> BackupDuplicate {
        BackupDuplicate {
            id: row.get("id"),
            folder_id: FolderId::new(
                row.get::<String, _>("share_id"),
                row.get::<String, _>("link_id"),
            ),
            hash: row.get("hash"),
            content_hash: row.get("content_hash"),
            link_id: row.get("remote_link_id"),
            link_state: row
                .get::<Option<String>, _>("link_state")
                .as_deref()
                .and_then(LinkState::parse),
            revision_id: row.get("revision_id"),
            client_uid: row.get("client_uid"),
        }
    }
}

#[async_trait]
impl BackupDuplicateRepository for SqliteBackupDuplicateRepository {
    async fn replace_for_hash(
        &self,
        folder_id: &FolderId,
        hash: &str,
        duplicates: &[BackupDuplicate],
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM backup_duplicates WHERE share_id = ? AND link_id = ? AND hash = ?")
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        for duplicate in duplicates {
            sqlx::query(
                r#"
                INSERT INTO backup_duplicates (
                    share_id, link_id, hash, content_hash, remote_link_id,
                    link_state, revision_id, client_uid
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .bind(hash)
            .bind(&duplicate.content_hash)
            .bind(&duplicate.link_id)
            .bind(duplicate.link_state.map(|state| state.as_str()))
            .bind(&duplicate.revision_id)
            .bind(&duplicate.client_uid)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_hash(&self, folder_id: &FolderId, hash: &str) -> Result<Vec<BackupDuplicate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, share_id, link_id, hash, content_hash, remote_link_id,
                   link_state, revision_id, client_uid
            FROM backup_duplicates
            WHERE share_id = ? AND link_id = ? AND hash = ?
            ORDER BY id
            "#,
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::from_row).collect())
    }

    async fn delete_by_hash(&self, folder_id: &FolderId, hash: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM backup_duplicates WHERE share_id = ? AND link_id = ? AND hash = ?",
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count(&self, folder_id: &FolderId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM backup_duplicates WHERE share_id = ? AND link_id = ?",
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backup_duplicates WHERE share_id = ? AND link_id = ?")
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
