//! # Host Bridge Traits
//!
//! Contracts between the backup core and the collaborators it does not own.
//!
//! ## Overview
//!
//! The backup pipeline never talks to a platform API, an HTTP client or a
//! crypto library directly. Each capability it needs is a trait in this crate,
//! implemented once per host (Android, iOS, desktop) and injected through
//! `core_runtime::config::CoreConfig`.
//!
//! ## Traits
//!
//! ### Local device
//! - [`MediaSource`](media::MediaSource) - Enumerate media items of a bucket
//! - [`DeviceStorage`](storage::DeviceStorage) - Free space on the device
//! - [`ContentHasher`](storage::ContentHasher) - Full content digests of local items
//!
//! ### Remote
//! - [`RemoteStore`](remote::RemoteStore) - Hash availability, batched uploads, quota
//!
//! ### Platform integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//! - [`TaskConstraints`](background::TaskConstraints) - Conditions a unit of work needs
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map platform failures onto the most specific variant available: the
//! backup core decides retry versus fatal handling from the variant alone.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one instance can serve every
//! folder worker concurrently.

pub mod background;
pub mod error;
pub mod media;
pub mod network;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::TaskConstraints;
pub use media::{MediaItem, MediaSource};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use remote::{
    CacheOption, FolderId, HashAvailability, LinkState, NotificationPolicy, PendingHash, Quota,
    RemoteStore, UploadItem, UploadItemResult,
};
pub use storage::{ContentHasher, DeviceStorage};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
