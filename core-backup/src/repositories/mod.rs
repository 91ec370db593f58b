//! # Storage Gateway
//!
//! Repository traits and SQLite implementations for the four backup record kinds.
//!
//! - `BackupFolderRepository` - bucket/remote folder pairings and their scan watermark
//! - `BackupFileRepository` - tracked media items and their state machine
//! - `BackupDuplicateRepository` - name-hash collisions awaiting content confirmation
//! - `BackupErrorRepository` - recorded failures, per folder or per user
//!
//! Every state change is a conditional update inside SQLite, which serializes
//! conflicting writers; readers never block them thanks to WAL mode.

pub mod duplicate;
pub mod error;
pub mod file;
pub mod folder;

pub use duplicate::{BackupDuplicateRepository, SqliteBackupDuplicateRepository};
pub use error::{BackupErrorRepository, SqliteBackupErrorRepository};
pub use file::{BackupFileRepository, SqliteBackupFileRepository};
pub use folder::{BackupFolderRepository, SqliteBackupFolderRepository};
