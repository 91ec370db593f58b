use async_trait::async_trait;
use bridge_traits::FolderId;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{PipelineError, Result};
use crate::models::{BackupFile, BackupFileState, BackupFolder, StateCounts};

/// Persistence of [`BackupFile`] rows and their state transitions.
///
/// Every transition is conditional on the current state, so two writers
/// racing on one row can never produce a transition the state machine forbids.
#[async_trait]
pub trait BackupFileRepository: Send + Sync {
    /// Insert files atomically, skipping `(folder, uri)` pairs already known.
    /// Returns only the newly inserted rows, with their ids.
    async fn insert_batch(&self, files: &[BackupFile]) -> Result<Vec<BackupFile>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<BackupFile>>;

    /// Files of one bucket in `state`, in scheduling order (priority, then insertion)
    async fn find_by_state(
        &self,
        folder: &BackupFolder,
        state: BackupFileState,
        limit: Option<usize>,
    ) -> Result<Vec<BackupFile>>;

    /// Move `from` -> `to` for the given ids; rows in any other state are untouched
    async fn transition(
        &self,
        ids: &[i64],
        from: BackupFileState,
        to: BackupFileState,
    ) -> Result<u64>;

    /// POSSIBLE_DUPLICATE -> READY, remembering the own draft the upload replaces
    async fn mark_ready_replacing(&self, id: i64, draft_link_id: &str) -> Result<bool>;

    /// READY -> ENQUEUED in one transaction. Returns the ids actually reserved.
    async fn mark_enqueued(&self, ids: &[i64]) -> Result<Vec<i64>>;

    /// ENQUEUED (or READY, after a concurrent reset) -> COMPLETED
    async fn mark_completed(&self, id: i64) -> Result<bool>;

    /// Count of files in `state` across every user and folder
    async fn count_global(&self, state: BackupFileState) -> Result<u64>;

    async fn count_in_bucket(&self, folder: &BackupFolder, state: BackupFileState) -> Result<u64>;

    /// Per-state counts over every bucket of a remote folder
    async fn count_by_state(&self, folder_id: &FolderId) -> Result<StateCounts>;

    async fn reset_enqueued_for_folder(&self, folder_id: &FolderId) -> Result<u64>;

    async fn reset_enqueued_for_user(&self, user_id: &str) -> Result<u64>;

    /// ENQUEUED -> READY everywhere, for rows no running upload owns
    async fn reset_enqueued_all(&self) -> Result<u64>;

    /// FAILED -> READY for a remote folder
    async fn retry_failed(&self, folder_id: &FolderId) -> Result<u64>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Purge COMPLETED and DUPLICATED rows of a remote folder
    async fn delete_terminal(&self, folder_id: &FolderId) -> Result<u64>;

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64>;
}

pub struct SqliteBackupFileRepository {
    pool: SqlitePool,
}

impl SqliteBackupFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &SqliteRow) -> Result<BackupFile> {
        Ok(BackupFile {
            id: row.get("id"),
            user_id: row.get("user_id"),
            bucket_id: row.get("bucket_id"),
            folder_id: FolderId::new(
                row.get::<String, _>("share_id"),
                row.get::<String, _>("link_id"),
            ),
            uri: row.get("uri"),
            name: row.get("name"),
            mime_type: row.get("mime_type"),
            hash: row.get("hash"),
            size: row.get::<i64, _>("size").max(0) as u64,
            capture_time: row.get("capture_time"),
            state: row.get::<String, _>("state").parse()?,
            upload_priority: row.get("upload_priority"),
            draft_link_id: row.get("draft_link_id"),
        })
    }

    async fn set_state_where(
        &self,
        filter: &str,
        binds: &[&str],
        from: &[BackupFileState],
        to: BackupFileState,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE backup_files SET state = ? WHERE {} AND state IN ({})",
            filter,
            placeholders(from.len())
        );

        let mut query = sqlx::query(&sql).bind(to.as_str());
        for value in binds {
            query = query.bind(*value);
        }
        for state in from {
            query = query.bind(state.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, bucket_id, share_id, link_id, uri, name, mime_type, hash,
           size, capture_time, state, upload_priority, draft_link_id
    FROM backup_files
"#;

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl BackupFileRepository for SqliteBackupFileRepository {
    async fn insert_batch(&self, files: &[BackupFile]) -> Result<Vec<BackupFile>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        let mut inserted = Vec::new();
        for file in files {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO backup_files (
                    user_id, bucket_id, share_id, link_id, uri, name, mime_type, hash,
                    size, capture_time, state, upload_priority
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&file.user_id)
            .bind(file.bucket_id)
            .bind(&file.folder_id.share_id)
            .bind(&file.folder_id.link_id)
            .bind(&file.uri)
            .bind(&file.name)
            .bind(&file.mime_type)
            .bind(&file.hash)
            .bind(file.size as i64)
            .bind(file.capture_time)
            .bind(file.state.as_str())
            .bind(file.upload_priority)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

            if result.rows_affected() == 1 {
                let mut stored = file.clone();
                stored.id = result.last_insert_rowid();
                inserted.push(stored);
            }
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(inserted)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<BackupFile>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_state(
        &self,
        folder: &BackupFolder,
        state: BackupFileState,
        limit: Option<usize>,
    ) -> Result<Vec<BackupFile>> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE share_id = ? AND link_id = ? AND bucket_id = ? AND state = ?
            ORDER BY upload_priority ASC, id ASC
            LIMIT ?"#,
            SELECT_COLUMNS
        ))
        .bind(&folder.folder_id.share_id)
        .bind(&folder.folder_id.link_id)
        .bind(folder.bucket_id)
        .bind(state.as_str())
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn transition(
        &self,
        ids: &[i64],
        from: BackupFileState,
        to: BackupFileState,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE backup_files SET state = ? WHERE state = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(from.as_str());
        for id in ids {
            query = query.bind(*id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_enqueued(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        let mut reserved = Vec::with_capacity(ids.len());
        for id in ids {
            let result =
                sqlx::query("UPDATE backup_files SET state = ? WHERE id = ? AND state = ?")
                    .bind(BackupFileState::Enqueued.as_str())
                    .bind(*id)
                    .bind(BackupFileState::Ready.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| PipelineError::Database(e.to_string()))?;

            if result.rows_affected() == 1 {
                reserved.push(*id);
            }
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(reserved)
    }

    async fn mark_completed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE backup_files SET state = ? WHERE id = ? AND state IN (?, ?)")
            .bind(BackupFileState::Completed.as_str())
            .bind(id)
            .bind(BackupFileState::Enqueued.as_str())
            .bind(BackupFileState::Ready.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_global(&self, state: BackupFileState) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM backup_files WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn count_in_bucket(&self, folder: &BackupFolder, state: BackupFileState) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM backup_files
            WHERE share_id = ? AND link_id = ? AND bucket_id = ? AND state = ?
            "#,
        )
        .bind(&folder.folder_id.share_id)
        .bind(&folder.folder_id.link_id)
        .bind(folder.bucket_id)
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(count as u64)
    }

    async fn count_by_state(&self, folder_id: &FolderId) -> Result<StateCounts> {
        let rows = sqlx::query(
            r#"
            SELECT state, COUNT(*) AS total FROM backup_files
            WHERE share_id = ? AND link_id = ?
            GROUP BY state
            "#,
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        let mut counts = StateCounts::default();
        for row in rows {
            let state: BackupFileState = row.get::<String, _>("state").parse()?;
            counts.add(state, row.get::<i64, _>("total") as u64);
        }

        Ok(counts)
    }

    async fn reset_enqueued_for_folder(&self, folder_id: &FolderId) -> Result<u64> {
        self.set_state_where(
            "share_id = ? AND link_id = ?",
            &[folder_id.share_id.as_str(), folder_id.link_id.as_str()],
            &[BackupFileState::Enqueued],
            BackupFileState::Ready,
        )
        .await
    }

    async fn reset_enqueued_for_user(&self, user_id: &str) -> Result<u64> {
        self.set_state_where(
            "user_id = ?",
            &[user_id],
            &[BackupFileState::Enqueued],
            BackupFileState::Ready,
        )
        .await
    }

    async fn mark_ready_replacing(&self, id: i64, draft_link_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backup_files SET state = ?, draft_link_id = ? WHERE id = ? AND state = ?",
        )
        .bind(BackupFileState::Ready.as_str())
        .bind(draft_link_id)
        .bind(id)
        .bind(BackupFileState::PossibleDuplicate.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_enqueued_all(&self) -> Result<u64> {
        self.set_state_where("1 = 1", &[], &[BackupFileState::Enqueued], BackupFileState::Ready)
            .await
    }

    async fn retry_failed(&self, folder_id: &FolderId) -> Result<u64> {
        self.set_state_where(
            "share_id = ? AND link_id = ?",
            &[folder_id.share_id.as_str(), folder_id.link_id.as_str()],
            &[BackupFileState::Failed],
            BackupFileState::Ready,
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_terminal(&self, folder_id: &FolderId) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM backup_files WHERE share_id = ? AND link_id = ? AND state IN (?, ?)",
        )
        .bind(&folder_id.share_id)
        .bind(&folder_id.link_id)
        .bind(BackupFileState::Completed.as_str())
        .bind(BackupFileState::Duplicated.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_folder(&self, folder_id: &FolderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backup_files WHERE share_id = ? AND link_id = ?")
            .bind(&folder_id.share_id)
            .bind(&folder_id.link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
