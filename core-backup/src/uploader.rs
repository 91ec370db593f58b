//! # Upload Scheduler
//!
//! Moves READY files through the external upload executor under a global
//! in-flight limit and a storage guard.
//!
//! Slot accounting and the READY -> ENQUEUED reservation happen under one
//! async lock shared by every folder, so two folders can never reserve the
//! same free slot. The upload itself runs outside the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bridge_traits::{BridgeError, DeviceStorage, RemoteStore};
use core_runtime::BackupSettings;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::classifier::classify;
use crate::error::{PipelineError, Result};
use crate::models::{
    BackupErrorKind, BackupFile, BackupFileState, BackupFolder, StorageKind, BACKUP_UPLOAD_PRIORITY,
};
use crate::repositories::BackupFileRepository;

/// A file the remote store rejected for good
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_id: i64,
    pub name: String,
    pub kind: BackupErrorKind,
    pub message: String,
}

/// Result of one scheduling pass over a bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Files handed to the executor in this pass
    pub enqueued: usize,
    pub completed: u64,
    /// Rows dropped because their source vanished
    pub removed: u64,
    /// Files put back to READY after a transient per-file failure
    pub requeued: u64,
    pub failures: Vec<FileFailure>,
    /// READY files of the bucket left after the pass
    pub remaining_ready: u64,
    /// ENQUEUED files of the bucket left after the pass
    pub in_flight: u64,
}

impl UploadOutcome {
    /// Nothing left to schedule or wait for in this bucket.
    pub fn is_complete(&self) -> bool {
        self.remaining_ready == 0 && self.in_flight == 0
    }
}

pub struct UploadScheduler {
    remote: Arc<dyn RemoteStore>,
    device_storage: Arc<dyn DeviceStorage>,
    files: Arc<dyn BackupFileRepository>,
    settings: BackupSettings,
    reservation: Mutex<()>,
}

impl UploadScheduler {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        device_storage: Arc<dyn DeviceStorage>,
        files: Arc<dyn BackupFileRepository>,
        settings: BackupSettings,
    ) -> Self {
        Self {
            remote,
            device_storage,
            files,
            settings,
            reservation: Mutex::new(()),
        }
    }

    /// Schedule and upload one batch of READY files of `folder`'s bucket.
    ///
    /// Returns [`PipelineError::InsufficientStorage`] without touching any
    /// file when the batch would not fit. When the executor rejects the whole
    /// batch, every file of it goes back to READY before the error is returned.
    #[instrument(skip(self, folder), fields(folder_id = %folder.folder_id, bucket_id = folder.bucket_id))]
    pub async fn upload_folder(&self, folder: &BackupFolder) -> Result<UploadOutcome> {
        let batch = match self.reserve(folder).await? {
            Some(batch) => batch,
            None => return self.finish(folder, UploadOutcome::default()).await,
        };

        let ids: Vec<i64> = batch.iter().map(|f| f.id).collect();
        let items: Vec<_> = batch.iter().map(BackupFile::to_upload_item).collect();
        let priority = batch
            .iter()
            .map(|f| f.upload_priority)
            .min()
            .unwrap_or(BACKUP_UPLOAD_PRIORITY);

        debug!(files = batch.len(), priority, "Handing batch to upload executor");

        let results = match self
            .remote
            .upload_files(
                &folder.folder_id,
                &items,
                priority,
                self.settings.cache_option,
                self.settings.notification_policy,
            )
            .await
        {
            Ok(results) => results,
            Err(e) => {
                let reset = self
                    .files
                    .transition(&ids, BackupFileState::Enqueued, BackupFileState::Ready)
                    .await?;
                warn!(error = %e, reset, "Upload batch rejected");
                return Err(e.into());
            }
        };

        let mut outcome = UploadOutcome {
            enqueued: batch.len(),
            ..UploadOutcome::default()
        };
        let mut by_uri: HashMap<&str, &BackupFile> =
            batch.iter().map(|f| (f.uri.as_str(), f)).collect();

        for result in results {
            let Some(file) = by_uri.remove(result.uri.as_str()) else {
                warn!(uri = %core_runtime::logging::strip_path(&result.uri), "Result for a file outside the batch");
                continue;
            };

            match result.outcome {
                Ok(link_id) => {
                    if self.files.mark_completed(file.id).await? {
                        outcome.completed += 1;
                        debug!(file_id = file.id, %link_id, "File uploaded");
                    }
                }
                Err(BridgeError::NotFound(_)) => {
                    if self.files.delete(file.id).await? {
                        outcome.removed += 1;
                    }
                    debug!(file_id = file.id, "Source vanished, dropping file");
                }
                Err(e) if e.is_transient() => {
                    outcome.requeued += self
                        .files
                        .transition(&[file.id], BackupFileState::Enqueued, BackupFileState::Ready)
                        .await?;
                }
                Err(e) => {
                    self.files
                        .transition(&[file.id], BackupFileState::Enqueued, BackupFileState::Failed)
                        .await?;
                    warn!(file_id = file.id, error = %e, "File upload failed");
                    let error = PipelineError::from(e);
                    outcome.failures.push(FileFailure {
                        file_id: file.id,
                        name: file.name.clone(),
                        kind: classify(&error).kind,
                        message: error.to_string(),
                    });
                }
            }
        }

        // Files the executor never reported on are retried later.
        let unreported: Vec<i64> = by_uri.values().map(|f| f.id).collect();
        if !unreported.is_empty() {
            outcome.requeued += self
                .files
                .transition(&unreported, BackupFileState::Enqueued, BackupFileState::Ready)
                .await?;
        }

        let outcome = self.finish(folder, outcome).await?;
        info!(
            enqueued = outcome.enqueued,
            completed = outcome.completed,
            failed = outcome.failures.len(),
            remaining = outcome.remaining_ready,
            "Upload pass finished"
        );
        Ok(outcome)
    }

    /// Reserve up to the free global slots for this bucket.
    /// `None` when no slot is free or nothing is READY.
    async fn reserve(&self, folder: &BackupFolder) -> Result<Option<Vec<BackupFile>>> {
        let _guard = self.reservation.lock().await;

        let in_flight = self.files.count_global(BackupFileState::Enqueued).await? as usize;
        let slots = self.settings.upload_limit_threshold.saturating_sub(in_flight);
        if slots == 0 {
            debug!(in_flight, "Upload limit reached");
            return Ok(None);
        }

        let candidates = self
            .files
            .find_by_state(folder, BackupFileState::Ready, Some(slots))
            .await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        self.check_storage(&folder.user_id, &candidates).await?;

        let ids: Vec<i64> = candidates.iter().map(|f| f.id).collect();
        let reserved: HashSet<i64> = self.files.mark_enqueued(&ids).await?.into_iter().collect();

        let batch: Vec<BackupFile> = candidates
            .into_iter()
            .filter(|f| reserved.contains(&f.id))
            .collect();
        Ok((!batch.is_empty()).then_some(batch))
    }

    async fn check_storage(&self, user_id: &str, batch: &[BackupFile]) -> Result<()> {
        let required: u64 = batch.iter().map(|f| f.size).sum();

        let quota = self.remote.query_quota(user_id).await?;
        if quota.used.saturating_add(required) > quota.max {
            return Err(PipelineError::InsufficientStorage {
                kind: StorageKind::Drive,
                required,
                available: quota.remaining(),
            });
        }

        let available = self.device_storage.available_bytes().await?;
        let needed = required.saturating_add(self.settings.min_free_local_bytes);
        if available < needed {
            return Err(PipelineError::InsufficientStorage {
                kind: StorageKind::Local,
                required: needed,
                available,
            });
        }

        Ok(())
    }

    async fn finish(&self, folder: &BackupFolder, mut outcome: UploadOutcome) -> Result<UploadOutcome> {
        outcome.remaining_ready = self
            .files
            .count_in_bucket(folder, BackupFileState::Ready)
            .await?;
        outcome.in_flight = self
            .files
            .count_in_bucket(folder, BackupFileState::Enqueued)
            .await?;
        Ok(outcome)
    }
}
