//! Backup domain records persisted by the storage gateway.

use bridge_traits::{FolderId, LinkState, MediaItem, UploadItem};
use core_runtime::events::FailureCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Priority of files discovered by a regular backup pass.
pub const BACKUP_UPLOAD_PRIORITY: i64 = 100;

/// Priority of files the user just captured; served before backlog files.
pub const RECENT_UPLOAD_PRIORITY: i64 = 10;

/// One (device bucket, remote folder) pairing being backed up for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFolder {
    pub user_id: String,
    pub bucket_id: i64,
    pub folder_id: FolderId,
    /// Capture time of the newest item already scanned
    pub update_time: Option<i64>,
    pub enabled: bool,
}

impl BackupFolder {
    pub fn new(user_id: impl Into<String>, bucket_id: i64, folder_id: FolderId) -> Self {
        Self {
            user_id: user_id.into(),
            bucket_id,
            folder_id,
            update_time: None,
            enabled: true,
        }
    }
}

/// Lifecycle of a [`BackupFile`].
///
/// ```text
/// Idle -> PossibleDuplicate -> Duplicated
///   \          \
///    `-> Ready <-'  <- Failed (retry)
///         |  ^
///         v  | (stop / transient failure)
///       Enqueued -> Completed
///         `-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupFileState {
    Idle,
    PossibleDuplicate,
    Ready,
    Enqueued,
    Completed,
    Failed,
    Duplicated,
}

impl BackupFileState {
    pub const ALL: [BackupFileState; 7] = [
        Self::Idle,
        Self::PossibleDuplicate,
        Self::Ready,
        Self::Enqueued,
        Self::Completed,
        Self::Failed,
        Self::Duplicated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PossibleDuplicate => "possible_duplicate",
            Self::Ready => "ready",
            Self::Enqueued => "enqueued",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Duplicated => "duplicated",
        }
    }

    /// Still needs dedup or upload work.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::PossibleDuplicate | Self::Ready | Self::Enqueued
        )
    }

    /// Eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Duplicated)
    }
}

impl fmt::Display for BackupFileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupFileState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidState(format!("unknown file state '{}'", s)))
    }
}

/// One local media item tracked by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Row id; also encodes insertion order. Zero until persisted.
    pub id: i64,
    pub user_id: String,
    pub bucket_id: i64,
    pub folder_id: FolderId,
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    /// Name hash used for cheap duplicate candidate matching
    pub hash: String,
    pub size: u64,
    pub capture_time: i64,
    pub state: BackupFileState,
    pub upload_priority: i64,
    /// Interrupted draft of this client left on the remote by an earlier upload
    pub draft_link_id: Option<String>,
}

impl BackupFile {
    /// Build an unsaved IDLE row for an item found in `folder`'s bucket.
    pub fn discovered(
        user_id: &str,
        folder: &BackupFolder,
        item: &MediaItem,
        hash: String,
        upload_priority: i64,
    ) -> Self {
        Self {
            id: 0,
            user_id: user_id.to_string(),
            bucket_id: folder.bucket_id,
            folder_id: folder.folder_id.clone(),
            uri: item.uri.clone(),
            name: item.name.clone(),
            mime_type: item.mime_type.clone(),
            hash,
            size: item.size,
            capture_time: item.capture_time,
            state: BackupFileState::Idle,
            upload_priority,
            draft_link_id: None,
        }
    }

    pub fn to_upload_item(&self) -> UploadItem {
        UploadItem {
            uri: self.uri.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            capture_time: self.capture_time,
            replace_draft: self.draft_link_id.clone(),
        }
    }
}

/// A remote item colliding with a local name hash, awaiting content confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDuplicate {
    pub id: i64,
    pub folder_id: FolderId,
    pub hash: String,
    pub content_hash: Option<String>,
    /// `None` when the server reported the collision without item details
    pub link_id: Option<String>,
    pub link_state: Option<LinkState>,
    pub revision_id: Option<String>,
    pub client_uid: Option<String>,
}

impl BackupDuplicate {
    pub fn from_pending(folder_id: &FolderId, pending: &bridge_traits::PendingHash) -> Self {
        Self {
            id: 0,
            folder_id: folder_id.clone(),
            hash: pending.hash.clone(),
            content_hash: pending.content_hash.clone(),
            link_id: Some(pending.link_id.clone()),
            link_state: Some(pending.link_state),
            revision_id: pending.revision_id.clone(),
            client_uid: pending.client_uid.clone(),
        }
    }

    /// Placeholder for a hash the server rejected without naming the conflicting item.
    pub fn unknown(folder_id: &FolderId, hash: &str) -> Self {
        Self {
            id: 0,
            folder_id: folder_id.clone(),
            hash: hash.to_string(),
            content_hash: None,
            link_id: None,
            link_state: None,
            revision_id: None,
            client_uid: None,
        }
    }
}

/// Which side ran out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    Local,
    Drive,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Local => f.write_str("local"),
            StorageKind::Drive => f.write_str("drive"),
        }
    }
}

/// Failure taxonomy of recorded backup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupErrorKind {
    Connectivity,
    LocalStorage,
    DriveStorage,
    Permission,
    Request,
    Other,
}

impl BackupErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::LocalStorage => "local_storage",
            Self::DriveStorage => "drive_storage",
            Self::Permission => "permission",
            Self::Request => "request",
            Self::Other => "other",
        }
    }

    /// Resource errors stop backup instead of being retried.
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::LocalStorage | Self::DriveStorage)
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Connectivity => FailureCategory::Network,
            Self::LocalStorage | Self::DriveStorage => FailureCategory::Storage,
            Self::Permission | Self::Request | Self::Other => FailureCategory::Other,
        }
    }
}

impl FromStr for BackupErrorKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connectivity" => Ok(Self::Connectivity),
            "local_storage" => Ok(Self::LocalStorage),
            "drive_storage" => Ok(Self::DriveStorage),
            "permission" => Ok(Self::Permission),
            "request" => Ok(Self::Request),
            "other" => Ok(Self::Other),
            _ => Err(PipelineError::InvalidState(format!(
                "unknown error kind '{}'",
                s
            ))),
        }
    }
}

/// A recorded failure, scoped to a user or to one of their folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupError {
    pub id: i64,
    pub user_id: String,
    /// `None` for user-wide errors such as exhausted storage
    pub folder_id: Option<FolderId>,
    pub kind: BackupErrorKind,
    pub retryable: bool,
    pub message: String,
    pub created_at: i64,
}

/// Number of files per state within a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub idle: u64,
    pub possible_duplicate: u64,
    pub ready: u64,
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub duplicated: u64,
}

impl StateCounts {
    pub fn add(&mut self, state: BackupFileState, count: u64) {
        let slot = match state {
            BackupFileState::Idle => &mut self.idle,
            BackupFileState::PossibleDuplicate => &mut self.possible_duplicate,
            BackupFileState::Ready => &mut self.ready,
            BackupFileState::Enqueued => &mut self.enqueued,
            BackupFileState::Completed => &mut self.completed,
            BackupFileState::Failed => &mut self.failed,
            BackupFileState::Duplicated => &mut self.duplicated,
        };
        *slot += count;
    }

    /// Files still waiting for dedup or upload.
    pub fn pending(&self) -> u64 {
        self.idle + self.possible_duplicate + self.ready + self.enqueued
    }

    pub fn total(&self) -> u64 {
        self.pending() + self.completed + self.failed + self.duplicated
    }
}
