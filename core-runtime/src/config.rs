//! # Core Configuration Module
//!
//! Provides configuration management for the backup core.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the database location, the
//! tunable [`BackupSettings`], and every host bridge the pipeline calls. The
//! builder fails fast: a missing bridge is reported as
//! [`Error::CapabilityMissing`] before any pipeline stage runs.
//!
//! ## Required Dependencies
//!
//! - `MediaSource` - Enumerates local media buckets
//! - `RemoteStore` - Hash checks, uploads and quota queries
//! - `ContentHasher` - Content digests for duplicate confirmation
//! - `DeviceStorage` - Free-space checks before uploads
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Holds network stages until connectivity returns.
//!   Without it, the device is assumed to be online.
//! - `Clock` - Defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{BackupSettings, CoreConfig};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/backup.db")
//!     .media_source(Arc::new(MediaStoreSource::new()))
//!     .remote_store(Arc::new(DriveClient::new()))
//!     .content_hasher(Arc::new(Sha1Hasher))
//!     .device_storage(Arc::new(StatFsStorage))
//!     .settings(BackupSettings {
//!         wifi_only: true,
//!         ..BackupSettings::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    CacheOption, Clock, ContentHasher, DeviceStorage, MediaSource, NetworkMonitor,
    NotificationPolicy, RemoteStore, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Tunables of the backup pipeline.
///
/// Every field has a default; hosts usually override only `wifi_only` and
/// the notification/caching options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Maximum number of files ENQUEUED at once across all folders
    pub upload_limit_threshold: usize,

    /// Attempts allowed for a retryable network operation
    pub max_api_auto_retries: u32,

    /// Name hashes sent per availability check
    pub hash_batch_size: usize,

    /// Delay before the second attempt; doubles on each further attempt
    pub initial_backoff_ms: u64,

    /// Upper bound of the retry delay
    pub max_backoff_ms: u64,

    /// Free bytes that must remain on the device after staging a batch
    pub min_free_local_bytes: u64,

    /// Only run network stages on an unmetered connection
    pub wifi_only: bool,

    /// Identifies remote drafts created by this installation
    pub client_uid: String,

    pub cache_option: CacheOption,

    pub notification_policy: NotificationPolicy,

    /// How often to re-check connectivity while waiting for a network
    pub network_poll_interval_ms: u64,

    /// How long the upload stage waits for a free slot before trying again
    pub slot_wait_ms: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            upload_limit_threshold: 5,
            max_api_auto_retries: 3,
            hash_batch_size: 150,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            min_free_local_bytes: 100 * MIB,
            wifi_only: false,
            client_uid: uuid::Uuid::new_v4().to_string(),
            cache_option: CacheOption::default(),
            notification_policy: NotificationPolicy::default(),
            network_poll_interval_ms: 5_000,
            slot_wait_ms: 1_000,
        }
    }
}

impl BackupSettings {
    /// Validates the settings and returns the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.upload_limit_threshold == 0 {
            return Err(Error::invalid_setting(
                "upload_limit_threshold",
                "must be greater than 0",
            ));
        }

        if self.hash_batch_size == 0 {
            return Err(Error::invalid_setting(
                "hash_batch_size",
                "must be greater than 0",
            ));
        }

        if self.initial_backoff_ms == 0 {
            return Err(Error::invalid_setting(
                "initial_backoff_ms",
                "must be greater than 0",
            ));
        }

        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::invalid_setting(
                "max_backoff_ms",
                format!(
                    "must be at least initial_backoff_ms ({})",
                    self.initial_backoff_ms
                ),
            ));
        }

        if self.client_uid.trim().is_empty() {
            return Err(Error::invalid_setting("client_uid", "cannot be empty"));
        }

        if self.network_poll_interval_ms == 0 || self.slot_wait_ms == 0 {
            return Err(Error::invalid_setting(
                "network_poll_interval_ms",
                "poll and slot wait intervals must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Delay to wait before running `attempt` (1-based).
    ///
    /// The first attempt runs immediately; later ones back off exponentially
    /// up to `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    pub fn network_poll_interval(&self) -> Duration {
        Duration::from_millis(self.network_poll_interval_ms)
    }

    pub fn slot_wait(&self) -> Duration {
        Duration::from_millis(self.slot_wait_ms)
    }
}

/// Core configuration for the backup core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    pub settings: BackupSettings,

    pub media_source: Arc<dyn MediaSource>,

    pub remote_store: Arc<dyn RemoteStore>,

    pub content_hasher: Arc<dyn ContentHasher>,

    pub device_storage: Arc<dyn DeviceStorage>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("settings", &self.settings)
            .field("media_source", &"MediaSource { ... }")
            .field("remote_store", &"RemoteStore { ... }")
            .field("content_hasher", &"ContentHasher { ... }")
            .field("device_storage", &"DeviceStorage { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.settings.wifi_only && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Wi-Fi only backup enabled but no NetworkMonitor provided. \
                 Disable wifi_only or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        self.settings.validate()
    }
}

fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required {}. Inject the host implementation with .{}().",
            capability,
            purpose,
            setter_name(capability)
        ),
    }
}

fn setter_name(capability: &str) -> String {
    let mut name = String::with_capacity(capability.len() + 4);
    for (i, ch) in capability.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                name.push('_');
            }
            name.extend(ch.to_lowercase());
        } else {
            name.push(ch);
        }
    }
    name
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    settings: Option<BackupSettings>,
    media_source: Option<Arc<dyn MediaSource>>,
    remote_store: Option<Arc<dyn RemoteStore>>,
    content_hasher: Option<Arc<dyn ContentHasher>>,
    device_storage: Option<Arc<dyn DeviceStorage>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/data/backup.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Replaces the default [`BackupSettings`].
    pub fn settings(mut self, settings: BackupSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn media_source(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.media_source = Some(source);
        self
    }

    pub fn remote_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.remote_store = Some(store);
        self
    }

    pub fn content_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.content_hasher = Some(hasher);
        self
    }

    pub fn device_storage(mut self, storage: Arc<dyn DeviceStorage>) -> Self {
        self.device_storage = Some(storage);
        self
    }

    /// Sets the network monitor. Required when `wifi_only` is enabled.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Overrides the system clock, mainly for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - The database path is missing
    /// - A required bridge is missing
    /// - A setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let media_source = self
            .media_source
            .ok_or_else(|| capability_missing("MediaSource", "to enumerate local buckets"))?;

        let remote_store = self.remote_store.ok_or_else(|| {
            capability_missing("RemoteStore", "to check hashes and upload files")
        })?;

        let content_hasher = self.content_hasher.ok_or_else(|| {
            capability_missing("ContentHasher", "to confirm duplicate candidates")
        })?;

        let device_storage = self.device_storage.ok_or_else(|| {
            capability_missing("DeviceStorage", "to guard uploads against low disk space")
        })?;

        let config = CoreConfig {
            database_path,
            settings: self.settings.unwrap_or_default(),
            media_source,
            remote_store,
            content_hasher,
            device_storage,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        BridgeError, FolderId, HashAvailability, MediaItem, NetworkInfo, Quota, UploadItem,
        UploadItemResult,
    };

    type BridgeResult<T> = std::result::Result<T, BridgeError>;

    struct MockMediaSource;

    #[async_trait]
    impl MediaSource for MockMediaSource {
        async fn list_items(
            &self,
            _bucket_id: i64,
            _since_capture_time: Option<i64>,
        ) -> BridgeResult<Vec<MediaItem>> {
            Ok(Vec::new())
        }
    }

    struct MockRemoteStore;

    #[async_trait]
    impl RemoteStore for MockRemoteStore {
        async fn check_available_hashes(
            &self,
            _folder: &FolderId,
            hashes: &[String],
        ) -> BridgeResult<HashAvailability> {
            Ok(HashAvailability {
                available: hashes.to_vec(),
                pending: Vec::new(),
            })
        }

        async fn upload_files(
            &self,
            _folder: &FolderId,
            items: &[UploadItem],
            _priority: i64,
            _cache_option: CacheOption,
            _notification_policy: NotificationPolicy,
        ) -> BridgeResult<Vec<UploadItemResult>> {
            Ok(items
                .iter()
                .map(|item| UploadItemResult::success(&item.uri, "link"))
                .collect())
        }

        async fn query_quota(&self, _user_id: &str) -> BridgeResult<Quota> {
            Ok(Quota { used: 0, max: 1 })
        }
    }

    struct MockHasher;

    #[async_trait]
    impl ContentHasher for MockHasher {
        async fn content_digest(&self, uri: &str) -> BridgeResult<String> {
            Ok(uri.to_string())
        }
    }

    struct MockStorage;

    #[async_trait]
    impl DeviceStorage for MockStorage {
        async fn available_bytes(&self) -> BridgeResult<u64> {
            Ok(u64::MAX)
        }
    }

    struct MockMonitor;

    #[async_trait]
    impl NetworkMonitor for MockMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::disconnected())
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/data/backup.db")
            .media_source(Arc::new(MockMediaSource))
            .remote_store(Arc::new(MockRemoteStore))
            .content_hasher(Arc::new(MockHasher))
            .device_storage(Arc::new(MockStorage))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = BackupSettings::default();
        assert_eq!(settings.upload_limit_threshold, 5);
        assert_eq!(settings.max_api_auto_retries, 3);
        assert_eq!(settings.hash_batch_size, 150);
        assert_eq!(settings.min_free_local_bytes, 100 * MIB);
        assert!(!settings.wifi_only);
        assert!(!settings.client_uid.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_backoff_is_exponential_and_bounded() {
        let settings = BackupSettings {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            ..BackupSettings::default()
        };

        assert_eq!(settings.backoff_for(1), Duration::ZERO);
        assert_eq!(settings.backoff_for(2), Duration::from_millis(100));
        assert_eq!(settings.backoff_for(3), Duration::from_millis(200));
        assert_eq!(settings.backoff_for(4), Duration::from_millis(400));
        assert_eq!(settings.backoff_for(6), Duration::from_millis(1_000));
        assert_eq!(settings.backoff_for(80), Duration::from_millis(1_000));
    }

    #[test]
    fn test_settings_reject_zero_threshold() {
        let settings = BackupSettings {
            upload_limit_threshold: 0,
            ..BackupSettings::default()
        };

        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSetting { ref field, .. } if field == "upload_limit_threshold"
        ));
    }

    #[test]
    fn test_settings_reject_inverted_backoff() {
        let settings = BackupSettings {
            initial_backoff_ms: 2_000,
            max_backoff_ms: 1_000,
            ..BackupSettings::default()
        };

        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_backoff_ms"));
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: BackupSettings =
            serde_json::from_str(r#"{"wifi_only": true, "upload_limit_threshold": 2}"#).unwrap();
        assert!(settings.wifi_only);
        assert_eq!(settings.upload_limit_threshold, 2);
        assert_eq!(settings.hash_batch_size, 150);
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .media_source(Arc::new(MockMediaSource))
            .remote_store(Arc::new(MockRemoteStore))
            .content_hasher(Arc::new(MockHasher))
            .device_storage(Arc::new(MockStorage))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_requires_remote_store() {
        let result = CoreConfig::builder()
            .database_path("/data/backup.db")
            .media_source(Arc::new(MockMediaSource))
            .content_hasher(Arc::new(MockHasher))
            .device_storage(Arc::new(MockStorage))
            .build();

        match result {
            Err(Error::CapabilityMissing {
                capability,
                message,
            }) => {
                assert_eq!(capability, "RemoteStore");
                assert!(message.contains(".remote_store()"));
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_requires_device_storage() {
        let result = CoreConfig::builder()
            .database_path("/data/backup.db")
            .media_source(Arc::new(MockMediaSource))
            .remote_store(Arc::new(MockRemoteStore))
            .content_hasher(Arc::new(MockHasher))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("DeviceStorage"));
        assert!(err_msg.contains("low disk space"));
    }

    #[test]
    fn test_builder_with_all_required_bridges() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/backup.db"));
        assert_eq!(config.settings.upload_limit_threshold, 5);
        assert!(config.network_monitor.is_none());
    }

    #[test]
    fn test_wifi_only_requires_network_monitor() {
        let settings = BackupSettings {
            wifi_only: true,
            ..BackupSettings::default()
        };

        let err = complete_builder()
            .settings(settings.clone())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("NetworkMonitor"));

        let config = complete_builder()
            .settings(settings)
            .network_monitor(Arc::new(MockMonitor))
            .build()
            .unwrap();
        assert!(config.settings.wifi_only);
    }

    #[test]
    fn test_builder_rejects_invalid_settings() {
        let result = complete_builder()
            .settings(BackupSettings {
                hash_batch_size: 0,
                ..BackupSettings::default()
            })
            .build();

        assert!(matches!(result, Err(Error::InvalidSetting { .. })));
    }

    #[test]
    fn test_setter_name() {
        assert_eq!(setter_name("MediaSource"), "media_source");
        assert_eq!(setter_name("ContentHasher"), "content_hasher");
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = complete_builder().build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.database_path, config.database_path);
        assert_eq!(cloned.settings, config.settings);
    }
}
