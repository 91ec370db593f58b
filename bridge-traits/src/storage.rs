//! Device Storage and Content Hashing Abstractions
//!
//! Provides platform-agnostic traits for querying free device space and for
//! computing content digests of local media.

use async_trait::async_trait;

use crate::error::Result;

/// Device storage trait
///
/// Abstracts free-space queries:
/// - Android: `StatFs` on the app cache volume
/// - iOS: `volumeAvailableCapacityForImportantUsage`
/// - Desktop: `statvfs` / `GetDiskFreeSpaceExW`
///
/// Uploads stage encrypted blocks on the device before sending them, so the
/// scheduler checks this before handing a batch to the executor.
#[async_trait]
pub trait DeviceStorage: Send + Sync {
    /// Bytes currently available to the application
    async fn available_bytes(&self) -> Result<u64>;
}

/// Content hasher trait
///
/// Computes the full content digest of a local item. This reads the whole
/// file and may take a long time for videos; callers treat it as a suspension
/// point.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ContentHasher;
///
/// async fn same_content(hasher: &dyn ContentHasher, uri: &str, remote: &str) -> Result<bool> {
///     Ok(hasher.content_digest(uri).await? == remote)
/// }
/// ```
#[async_trait]
pub trait ContentHasher: Send + Sync {
    /// Digest of the item behind `uri`, formatted the way the remote reports it
    async fn content_digest(&self, uri: &str) -> Result<String>;
}
