//! # Folder Status Aggregator
//!
//! Derives a [`BackupStatus`] for a remote folder from the state counts of
//! all its buckets, its enabled flag and the recorded errors, and purges
//! terminal rows once a folder is complete.

use std::sync::Arc;

use bridge_traits::FolderId;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::{BackupError, BackupErrorKind, StateCounts};
use crate::repositories::{BackupErrorRepository, BackupFileRepository, BackupFolderRepository};

/// Why a folder stopped with files still pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncompletedReason {
    Disabled,
    LocalStorage,
    DriveStorage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "details")]
pub enum BackupStatus {
    InProgress(StateCounts),
    Complete,
    Failed(Vec<BackupError>),
    Uncompleted(UncompletedReason),
}

/// Statistics of a cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub completed: u64,
    pub duplicated: u64,
    pub purged: u64,
}

pub struct StatusAggregator {
    folders: Arc<dyn BackupFolderRepository>,
    files: Arc<dyn BackupFileRepository>,
    errors: Arc<dyn BackupErrorRepository>,
}

impl StatusAggregator {
    pub fn new(
        folders: Arc<dyn BackupFolderRepository>,
        files: Arc<dyn BackupFileRepository>,
        errors: Arc<dyn BackupErrorRepository>,
    ) -> Self {
        Self {
            folders,
            files,
            errors,
        }
    }

    pub async fn counts(&self, folder_id: &FolderId) -> Result<StateCounts> {
        self.files.count_by_state(folder_id).await
    }

    /// Current status of a remote folder.
    ///
    /// Precedence: disabled with pending files, then recorded failures (a
    /// storage stop with pending files reads as Uncompleted), then complete,
    /// then in progress.
    pub async fn status(&self, folder_id: &FolderId) -> Result<BackupStatus> {
        let buckets = self.folders.find_by_folder(folder_id).await?;
        let Some(first) = buckets.first() else {
            return Err(PipelineError::FolderNotFound {
                folder_id: folder_id.to_string(),
            });
        };

        let counts = self.files.count_by_state(folder_id).await?;
        let pending = counts.pending();
        let enabled = buckets.iter().any(|b| b.enabled);

        if !enabled && pending > 0 {
            return Ok(BackupStatus::Uncompleted(UncompletedReason::Disabled));
        }

        let errors = self.errors.find_for_folder(&first.user_id, folder_id).await?;
        if !errors.is_empty() {
            if pending > 0 {
                let stop = errors.iter().rev().find_map(|e| match e.kind {
                    BackupErrorKind::LocalStorage => Some(UncompletedReason::LocalStorage),
                    BackupErrorKind::DriveStorage => Some(UncompletedReason::DriveStorage),
                    _ => None,
                });
                let only_resource = errors.iter().all(|e| e.kind.is_resource());
                if let (Some(reason), true) = (stop, only_resource) {
                    return Ok(BackupStatus::Uncompleted(reason));
                }
            }
            return Ok(BackupStatus::Failed(errors));
        }

        if pending == 0 {
            Ok(BackupStatus::Complete)
        } else {
            Ok(BackupStatus::InProgress(counts))
        }
    }

    /// Purge COMPLETED and DUPLICATED rows of a complete folder.
    ///
    /// Returns `None` when the folder is not complete yet.
    #[instrument(skip(self), fields(folder_id = %folder_id))]
    pub async fn cleanup(&self, folder_id: &FolderId) -> Result<Option<CleanupReport>> {
        if self.status(folder_id).await? != BackupStatus::Complete {
            return Ok(None);
        }

        let counts = self.files.count_by_state(folder_id).await?;
        let purged = self.files.delete_terminal(folder_id).await?;

        let report = CleanupReport {
            completed: counts.completed,
            duplicated: counts.duplicated,
            purged,
        };
        info!(
            uploaded = report.completed,
            duplicated = report.duplicated,
            failed = counts.failed,
            purged = report.purged,
            "Folder backup complete"
        );
        Ok(Some(report))
    }
}
