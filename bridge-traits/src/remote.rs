//! Remote Content-Addressed Store
//!
//! Contract for the remote backup service: hash availability checks used for
//! deduplication, batched uploads, and quota queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Identity of a remote folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FolderId {
    pub share_id: String,
    pub link_id: String,
}

impl FolderId {
    pub fn new(share_id: impl Into<String>, link_id: impl Into<String>) -> Self {
        Self {
            share_id: share_id.into(),
            link_id: link_id.into(),
        }
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.share_id, self.link_id)
    }
}

/// Lifecycle state of a remote item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Upload started but never committed
    Draft,
    Active,
    Trashed,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Draft => "draft",
            LinkState::Active => "active",
            LinkState::Trashed => "trashed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(LinkState::Draft),
            "active" => Some(LinkState::Active),
            "trashed" => Some(LinkState::Trashed),
            _ => None,
        }
    }
}

/// A remote item occupying a name hash we asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHash {
    pub hash: String,
    /// Content digest of the remote item, when the server knows it
    pub content_hash: Option<String>,
    pub link_id: String,
    pub link_state: LinkState,
    pub revision_id: Option<String>,
    /// Client that created the remote item
    pub client_uid: Option<String>,
}

/// Response of a hash availability check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashAvailability {
    /// Hashes with no remote item; safe to upload under that name
    pub available: Vec<String>,
    /// Remote items colliding with requested hashes
    pub pending: Vec<PendingHash>,
}

/// Which derived artifacts the uploader keeps cached locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheOption {
    None,
    #[default]
    ThumbnailsOnly,
    All,
}

/// Whether the host shows per-file upload notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotificationPolicy {
    Show,
    #[default]
    Silent,
}

/// One local file handed to the upload executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub capture_time: i64,
    /// Our own unfinished draft to replace instead of uploading beside it
    pub replace_draft: Option<String>,
}

/// Per-item outcome of an upload batch
#[derive(Debug)]
pub struct UploadItemResult {
    pub uri: String,
    /// Remote link id of the committed item, or why this item failed
    pub outcome: std::result::Result<String, BridgeError>,
}

impl UploadItemResult {
    pub fn success(uri: impl Into<String>, link_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            outcome: Ok(link_id.into()),
        }
    }

    pub fn failure(uri: impl Into<String>, error: BridgeError) -> Self {
        Self {
            uri: uri.into(),
            outcome: Err(error),
        }
    }
}

/// Remote storage usage for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub used: u64,
    pub max: u64,
}

impl Quota {
    pub fn remaining(&self) -> u64 {
        self.max.saturating_sub(self.used)
    }
}

/// Remote store trait
///
/// An `Err` from any method is a batch-level failure; per-item upload failures
/// are reported inside [`UploadItemResult`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Ask which name hashes are free inside a remote folder
    async fn check_available_hashes(
        &self,
        folder: &FolderId,
        hashes: &[String],
    ) -> Result<HashAvailability>;

    /// Upload a batch of local files into a remote folder
    async fn upload_files(
        &self,
        folder: &FolderId,
        items: &[UploadItem],
        priority: i64,
        cache_option: CacheOption,
        notification_policy: NotificationPolicy,
    ) -> Result<Vec<UploadItemResult>>;

    /// Current remote storage usage
    async fn query_quota(&self, user_id: &str) -> Result<Quota>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_id_display() {
        let folder = FolderId::new("share-1", "link-9");
        assert_eq!(folder.to_string(), "share-1/link-9");
    }

    #[test]
    fn test_link_state_round_trip() {
        for state in [LinkState::Draft, LinkState::Active, LinkState::Trashed] {
            assert_eq!(LinkState::parse(state.as_str()), Some(state));
        }
        assert_eq!(LinkState::parse("deleted"), None);
    }

    #[test]
    fn test_quota_remaining_saturates() {
        let quota = Quota { used: 12, max: 10 };
        assert_eq!(quota.remaining(), 0);
    }
}
