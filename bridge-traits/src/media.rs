//! Local Media Enumeration
//!
//! Abstracts the device media index (MediaStore, PhotoKit, a watched directory)
//! so the scanner can list items of one bucket without knowing the platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One media item as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable content reference (e.g. `content://media/external/images/42`)
    pub uri: String,
    /// Display name including extension
    pub name: String,
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Capture (or last modification) time, Unix seconds
    pub capture_time: i64,
}

/// Media source trait
///
/// Implementations must return every item of `bucket_id` whose capture time is
/// strictly greater than `since_capture_time`, or every item when it is `None`.
/// Order is not significant; the scanner sorts results itself.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::media::MediaSource;
///
/// async fn count_new(source: &dyn MediaSource, bucket: i64, since: i64) -> Result<usize> {
///     Ok(source.list_items(bucket, Some(since)).await?.len())
/// }
/// ```
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// List media items of a bucket newer than the given capture time
    async fn list_items(
        &self,
        bucket_id: i64,
        since_capture_time: Option<i64>,
    ) -> Result<Vec<MediaItem>>;
}
