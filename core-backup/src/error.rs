use bridge_traits::BridgeError;
use thiserror::Error;

use crate::models::StorageKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Enumerating bucket {bucket_id} failed: {source}")]
    Enumeration {
        bucket_id: i64,
        #[source]
        source: BridgeError,
    },

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Backup folder {folder_id} not found")]
    FolderNotFound { folder_id: String },

    #[error("Backup is disabled for folder {folder_id}")]
    FolderDisabled { folder_id: String },

    #[error("Backup is stopped for user {user_id}")]
    BackupStopped { user_id: String },

    #[error("Insufficient {kind} storage: {required} bytes needed, {available} available")]
    InsufficientStorage {
        kind: StorageKind,
        required: u64,
        available: u64,
    },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Errors that end a pass without being recorded as a backup failure.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled
                | PipelineError::FolderDisabled { .. }
                | PipelineError::BackupStopped { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
