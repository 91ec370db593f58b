//! # Bucket Scanner
//!
//! Enumerates local media newer than a folder's watermark and persists them
//! as IDLE [`BackupFile`] rows.
//!
//! Items are inserted oldest first, in chunks, each chunk in its own
//! transaction. The watermark only advances over items that are durably
//! stored, so an interrupted scan observes the remaining items on the next
//! pass instead of skipping them.

use std::sync::Arc;

use bridge_traits::{MediaItem, MediaSource};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::models::{BackupFile, BackupFolder};
use crate::repositories::{BackupFileRepository, BackupFolderRepository};

/// Rows inserted per transaction
pub const DEFAULT_SCAN_CHUNK_SIZE: usize = 200;

/// Name hash of a media item: SHA-256 over bucket, name and size.
pub fn name_hash(bucket_id: i64, name: &str, size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket_id.to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(size.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct BucketScanner {
    media_source: Arc<dyn MediaSource>,
    folders: Arc<dyn BackupFolderRepository>,
    files: Arc<dyn BackupFileRepository>,
    chunk_size: usize,
}

impl BucketScanner {
    pub fn new(
        media_source: Arc<dyn MediaSource>,
        folders: Arc<dyn BackupFolderRepository>,
        files: Arc<dyn BackupFileRepository>,
    ) -> Self {
        Self {
            media_source,
            folders,
            files,
            chunk_size: DEFAULT_SCAN_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Scan the bucket of `folder` and return the newly inserted files.
    ///
    /// The watermark is read from storage rather than from `folder`, so a
    /// stale in-memory copy can never rewind it.
    #[instrument(skip(self, folder), fields(folder_id = %folder.folder_id, bucket_id = folder.bucket_id))]
    pub async fn scan(
        &self,
        user_id: &str,
        folder: &BackupFolder,
        upload_priority: i64,
    ) -> Result<Vec<BackupFile>> {
        let stored = self
            .folders
            .find(user_id, folder.bucket_id, &folder.folder_id)
            .await?
            .ok_or_else(|| PipelineError::FolderNotFound {
                folder_id: folder.folder_id.to_string(),
            })?;

        let watermark = stored.update_time;
        let mut items = self
            .media_source
            .list_items(stored.bucket_id, watermark)
            .await
            .map_err(|source| PipelineError::Enumeration {
                bucket_id: stored.bucket_id,
                source,
            })?;

        // Sources may return items at the watermark itself.
        items.retain(|item| watermark.map_or(true, |w| item.capture_time > w));
        items.sort_by(|a, b| {
            a.capture_time
                .cmp(&b.capture_time)
                .then_with(|| a.uri.cmp(&b.uri))
        });

        if items.is_empty() {
            debug!(?watermark, "No media newer than watermark");
            return Ok(Vec::new());
        }

        let mut inserted = Vec::new();
        let mut persisted_until = None;

        for chunk in items.chunks(self.chunk_size) {
            let rows: Vec<BackupFile> = chunk
                .iter()
                .map(|item| self.to_backup_file(user_id, &stored, item, upload_priority))
                .collect();

            match self.files.insert_batch(&rows).await {
                Ok(new_rows) => {
                    inserted.extend(new_rows);
                    persisted_until = chunk.last().map(|item| item.capture_time);
                }
                Err(e) => {
                    let failed_at = chunk[0].capture_time;
                    let safe_until = items
                        .iter()
                        .take_while(|item| item.capture_time < failed_at)
                        .map(|item| item.capture_time)
                        .last();

                    warn!(
                        error = %e,
                        persisted = inserted.len(),
                        ?safe_until,
                        "Scan interrupted while persisting files"
                    );

                    if let Some(update_time) = safe_until {
                        self.folders.advance_watermark(&stored, update_time).await?;
                    }
                    return Err(e);
                }
            }
        }

        if let Some(update_time) = persisted_until {
            self.folders.advance_watermark(&stored, update_time).await?;
        }

        info!(
            observed = items.len(),
            new_files = inserted.len(),
            watermark = ?persisted_until,
            "Bucket scanned"
        );

        Ok(inserted)
    }

    fn to_backup_file(
        &self,
        user_id: &str,
        folder: &BackupFolder,
        item: &MediaItem,
        upload_priority: i64,
    ) -> BackupFile {
        let hash = name_hash(folder.bucket_id, &item.name, item.size);
        BackupFile::discovered(user_id, folder, item, hash, upload_priority)
    }
}
