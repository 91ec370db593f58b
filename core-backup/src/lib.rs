//! # Core Backup Module
//!
//! Backs up local media buckets into remote folders.
//!
//! ## Overview
//!
//! Every media item found on the device becomes a [`BackupFile`] that walks
//! a small state machine: it is scanned, checked against the remote for
//! duplicates, uploaded in bounded batches, and purged once its folder is
//! complete. State lives in SQLite, so a restart resumes where the previous
//! process stopped.
//!
//! ## Components
//!
//! - [`BucketScanner`] - Incremental, watermark-based bucket enumeration
//! - [`DuplicateDetector`] - Name hash candidates confirmed by content digest
//! - [`UploadScheduler`] - Slot-limited batches with storage guards
//! - [`ErrorClassifier`] - Retry policy and failure recording
//! - [`StatusAggregator`] - Per-folder status and cleanup
//! - [`BackupCoordinator`] - One serialized worker per remote folder
//!
//! Host capabilities (media enumeration, uploads, hashing, storage and
//! network state) come in through `bridge_traits` and are injected with
//! `core_runtime::CoreConfig`.

pub mod classifier;
pub mod coordinator;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod models;
pub mod repositories;
pub mod scanner;
pub mod status;
pub mod uploader;

pub use classifier::{classify, Classification, ErrorClassifier, ErrorScope};
pub use coordinator::{BackupCoordinator, SyncTrigger};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use duplicates::{CandidateSummary, ConfirmationSummary, DuplicateDetector};
pub use error::{PipelineError, Result};
pub use models::*;
pub use repositories::{
    BackupDuplicateRepository, BackupErrorRepository, BackupFileRepository,
    BackupFolderRepository, SqliteBackupDuplicateRepository, SqliteBackupErrorRepository,
    SqliteBackupFileRepository, SqliteBackupFolderRepository,
};
pub use scanner::{name_hash, BucketScanner};
pub use status::{BackupStatus, CleanupReport, StatusAggregator, UncompletedReason};
pub use uploader::{FileFailure, UploadOutcome, UploadScheduler};
