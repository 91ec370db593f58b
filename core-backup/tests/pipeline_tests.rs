//! End-to-end tests of the backup pipeline over an in-memory database and
//! scripted host bridges.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, CacheOption, ContentHasher, DeviceStorage, FolderId, HashAvailability, LinkState,
    MediaItem, MediaSource, NetworkInfo, NetworkMonitor, NetworkType, NotificationPolicy,
    PendingHash, Quota, RemoteStore, UploadItem, UploadItemResult,
};
use core_backup::{
    create_test_pool, name_hash, BackupCoordinator, BackupErrorKind, BackupFileRepository,
    BackupFileState, BackupFolder, BackupFolderRepository, BackupStatus, PipelineError,
    SqliteBackupFileRepository, SqliteBackupFolderRepository, UncompletedReason,
};
use core_runtime::events::{BackupEvent, CoreEvent, Receiver, StopReason};
use core_runtime::{BackupSettings, CoreConfig, EventBus};
use sqlx::SqlitePool;
use tokio::sync::Notify;

const USER: &str = "user-1";
const CAMERA: i64 = 1;
const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Host fakes
// ============================================================================

#[derive(Default)]
struct FakeMedia {
    buckets: Mutex<HashMap<i64, Vec<MediaItem>>>,
    failing_scans: AtomicUsize,
}

impl FakeMedia {
    fn add(&self, bucket_id: i64, name: &str, capture_time: i64) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket_id)
            .or_default()
            .push(item(bucket_id, name, capture_time));
    }
}

fn item(bucket_id: i64, name: &str, capture_time: i64) -> MediaItem {
    MediaItem {
        uri: format!("content://media/{}/{}", bucket_id, name),
        name: name.to_string(),
        mime_type: "image/jpeg".to_string(),
        size: 1_000,
        capture_time,
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn list_items(
        &self,
        bucket_id: i64,
        since_capture_time: Option<i64>,
    ) -> BridgeResult<Vec<MediaItem>> {
        if self
            .failing_scans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "media store busy",
            )));
        }
        let buckets = self.buckets.lock().unwrap();
        Ok(buckets
            .get(&bucket_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| since_capture_time.map_or(true, |since| i.capture_time > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

type FailureFactory = fn(&str) -> BridgeError;

/// Remote drive keeping uploaded items by name hash
struct FakeRemote {
    existing: Mutex<HashMap<String, PendingHash>>,
    uploaded: Mutex<Vec<String>>,
    replaced_drafts: Mutex<Vec<String>>,
    priorities: Mutex<Vec<i64>>,
    failing_uris: Mutex<HashMap<String, FailureFactory>>,
    failing_batches: AtomicUsize,
    quota: Mutex<Quota>,
    hold_uploads: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            existing: Mutex::new(HashMap::new()),
            uploaded: Mutex::new(Vec::new()),
            replaced_drafts: Mutex::new(Vec::new()),
            priorities: Mutex::new(Vec::new()),
            failing_uris: Mutex::new(HashMap::new()),
            failing_batches: AtomicUsize::new(0),
            quota: Mutex::new(Quota {
                used: 0,
                max: u64::MAX / 2,
            }),
            hold_uploads: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn put_existing(&self, hash: String, content_hash: &str, state: LinkState) {
        self.existing.lock().unwrap().insert(
            hash.clone(),
            PendingHash {
                hash,
                content_hash: Some(content_hash.to_string()),
                link_id: "remote-link".to_string(),
                link_state: state,
                revision_id: Some("rev-1".to_string()),
                client_uid: None,
            },
        );
    }

    fn put_draft(&self, hash: String, client_uid: &str) {
        self.existing.lock().unwrap().insert(
            hash.clone(),
            PendingHash {
                hash,
                content_hash: None,
                link_id: "draft-link".to_string(),
                link_state: LinkState::Draft,
                revision_id: None,
                client_uid: Some(client_uid.to_string()),
            },
        );
    }

    fn fail_uri(&self, uri: &str, failure: FailureFactory) {
        self.failing_uris
            .lock()
            .unwrap()
            .insert(uri.to_string(), failure);
    }

    fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold_uploads.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn check_available_hashes(
        &self,
        _folder: &FolderId,
        hashes: &[String],
    ) -> BridgeResult<HashAvailability> {
        let existing = self.existing.lock().unwrap();
        let mut availability = HashAvailability::default();
        for hash in hashes {
            match existing.get(hash) {
                Some(pending) => availability.pending.push(pending.clone()),
                None => availability.available.push(hash.clone()),
            }
        }
        Ok(availability)
    }

    async fn upload_files(
        &self,
        _folder: &FolderId,
        items: &[UploadItem],
        priority: i64,
        _cache_option: CacheOption,
        _notification_policy: NotificationPolicy,
    ) -> BridgeResult<Vec<UploadItemResult>> {
        if self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BridgeError::Network("connection reset".to_string()));
        }

        let now = self.in_flight.fetch_add(items.len(), Ordering::SeqCst) + items.len();
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.priorities.lock().unwrap().push(priority);

        let gate = self.hold_uploads.lock().unwrap().clone();
        match gate {
            Some(gate) => gate.notified().await,
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
        self.in_flight.fetch_sub(items.len(), Ordering::SeqCst);

        let failing = self.failing_uris.lock().unwrap().clone();
        let mut results = Vec::new();
        for item in items {
            match failing.get(&item.uri) {
                Some(failure) => results.push(UploadItemResult::failure(&item.uri, failure(&item.uri))),
                None => {
                    if let Some(draft) = &item.replace_draft {
                        self.replaced_drafts.lock().unwrap().push(draft.clone());
                    }
                    self.uploaded.lock().unwrap().push(item.uri.clone());
                    results.push(UploadItemResult::success(&item.uri, format!("link-{}", item.name)));
                }
            }
        }
        Ok(results)
    }

    async fn query_quota(&self, _user_id: &str) -> BridgeResult<Quota> {
        Ok(*self.quota.lock().unwrap())
    }
}

struct FakeHasher;

#[async_trait]
impl ContentHasher for FakeHasher {
    async fn content_digest(&self, uri: &str) -> BridgeResult<String> {
        Ok(digest_of(uri))
    }
}

fn digest_of(uri: &str) -> String {
    format!("sha1:{}", uri)
}

struct FakeStorage(AtomicU64);

#[async_trait]
impl DeviceStorage for FakeStorage {
    async fn available_bytes(&self) -> BridgeResult<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

struct FakeNetwork(Mutex<NetworkInfo>);

impl FakeNetwork {
    fn set(&self, info: NetworkInfo) {
        *self.0.lock().unwrap() = info;
    }
}

#[async_trait]
impl NetworkMonitor for FakeNetwork {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        Ok(self.0.lock().unwrap().clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    coordinator: BackupCoordinator,
    media: Arc<FakeMedia>,
    remote: Arc<FakeRemote>,
    network: Arc<FakeNetwork>,
    files: SqliteBackupFileRepository,
    folders: SqliteBackupFolderRepository,
    events: Receiver<CoreEvent>,
}

fn test_settings() -> BackupSettings {
    BackupSettings {
        upload_limit_threshold: 5,
        max_api_auto_retries: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        min_free_local_bytes: 0,
        network_poll_interval_ms: 10,
        slot_wait_ms: 10,
        client_uid: "this-device".to_string(),
        ..BackupSettings::default()
    }
}

async fn harness(settings: BackupSettings) -> Harness {
    let pool = create_test_pool().await.unwrap();
    harness_on(pool, settings).await
}

async fn harness_on(pool: SqlitePool, settings: BackupSettings) -> Harness {
    let media = Arc::new(FakeMedia::default());
    let remote = Arc::new(FakeRemote::new());
    let network = Arc::new(FakeNetwork(Mutex::new(NetworkInfo::connected(
        NetworkType::WiFi,
        false,
    ))));

    let config = CoreConfig::builder()
        .database_path("backup-test.db")
        .media_source(media.clone())
        .remote_store(remote.clone())
        .content_hasher(Arc::new(FakeHasher))
        .device_storage(Arc::new(FakeStorage(AtomicU64::new(u64::MAX / 2))))
        .network_monitor(network.clone())
        .settings(settings)
        .build()
        .unwrap();

    let events = EventBus::new(1_000);
    let receiver = events.subscribe();

    Harness {
        coordinator: BackupCoordinator::new(&config, pool.clone(), events),
        media,
        remote,
        network,
        files: SqliteBackupFileRepository::new(pool.clone()),
        folders: SqliteBackupFolderRepository::new(pool),
        events: receiver,
    }
}

fn camera() -> FolderId {
    FolderId::new("share-1", "camera")
}

impl Harness {
    async fn wait_for<F>(&mut self, mut predicate: F) -> BackupEvent
    where
        F: FnMut(&BackupEvent) -> bool,
    {
        let wait = async {
            loop {
                match self.events.recv().await {
                    Ok(CoreEvent::Backup(event)) if predicate(&event) => return event,
                    Ok(_) => {}
                    Err(e) => panic!("event stream broken: {}", e),
                }
            }
        };
        tokio::time::timeout(TIMEOUT, wait)
            .await
            .expect("timed out waiting for event")
    }

    async fn wait_completed(&mut self, folder_id: &FolderId) {
        let folder_id = folder_id.clone();
        self.wait_for(|e| matches!(e, BackupEvent::FolderCompleted { folder_id: f } if *f == folder_id))
            .await;
    }

    async fn wait_idle(&self, folder_id: &FolderId) {
        tokio::time::timeout(TIMEOUT, async {
            while self.coordinator.is_folder_active(folder_id).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("folder never became idle");
    }

    async fn wait_upload_started(&self) {
        tokio::time::timeout(TIMEOUT, async {
            while self.remote.in_flight.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("no upload started");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_new_media_is_uploaded_and_purged() {
    let mut h = harness(test_settings()).await;
    for (i, name) in ["a.jpg", "b.jpg", "c.jpg"].iter().enumerate() {
        h.media.add(CAMERA, name, 100 + i as i64);
    }

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    let mut uploaded = h.remote.uploaded();
    uploaded.sort();
    assert_eq!(uploaded.len(), 3);
    assert_eq!(uploaded[0], "content://media/1/a.jpg");

    assert_eq!(h.coordinator.status(&camera()).await.unwrap(), BackupStatus::Complete);
    assert_eq!(h.files.count_by_state(&camera()).await.unwrap().total(), 0);

    let folder = h.folders.find(USER, CAMERA, &camera()).await.unwrap().unwrap();
    assert_eq!(folder.update_time, Some(102));
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_progress_events_follow_the_pipeline() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.media.add(CAMERA, "b.jpg", 2);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();

    match h.wait_for(|e| matches!(e, BackupEvent::FolderScanned { .. })).await {
        BackupEvent::FolderScanned {
            bucket_id,
            new_files,
            ..
        } => {
            assert_eq!(bucket_id, CAMERA);
            assert_eq!(new_files, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
    h.wait_for(|e| matches!(e, BackupEvent::FileCountChanged { pending: 2, .. }))
        .await;
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_matching_remote_content_is_not_uploaded_again() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.media.add(CAMERA, "b.jpg", 2);
    h.media.add(CAMERA, "c.jpg", 3);

    let a = item(CAMERA, "a.jpg", 1);
    h.remote.put_existing(
        name_hash(CAMERA, &a.name, a.size),
        &digest_of(&a.uri),
        LinkState::Active,
    );
    // Same name on the remote, different bytes: uploaded as a new file.
    let b = item(CAMERA, "b.jpg", 2);
    h.remote.put_existing(
        name_hash(CAMERA, &b.name, b.size),
        "sha1:something-else",
        LinkState::Active,
    );

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    let uploaded: HashSet<String> = h.remote.uploaded().into_iter().collect();
    assert!(!uploaded.contains(&a.uri));
    assert!(uploaded.contains(&b.uri));
    assert_eq!(uploaded.len(), 2);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_trashed_remote_copy_does_not_count_as_backup() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    let a = item(CAMERA, "a.jpg", 1);
    h.remote.put_existing(
        name_hash(CAMERA, &a.name, a.size),
        &digest_of(&a.uri),
        LinkState::Trashed,
    );

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.remote.uploaded(), vec![a.uri]);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_rescan_only_picks_up_newer_media() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 10);
    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    h.media.add(CAMERA, "b.jpg", 20);
    h.coordinator.sync_folder(&camera(), core_backup::RECENT_UPLOAD_PRIORITY).await.unwrap();
    h.wait_completed(&camera()).await;

    let uploaded = h.remote.uploaded();
    assert_eq!(uploaded.len(), 2);
    assert_eq!(uploaded[1], "content://media/1/b.jpg");
    assert_eq!(
        h.remote.priorities.lock().unwrap().last().copied(),
        Some(core_backup::RECENT_UPLOAD_PRIORITY)
    );
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_failed_file_is_reported_and_retried() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "good.jpg", 1);
    h.media.add(CAMERA, "bad.jpg", 2);
    let bad = item(CAMERA, "bad.jpg", 2);
    h.remote
        .fail_uri(&bad.uri, |_| BridgeError::InvalidRequest("corrupt file".to_string()));

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_idle(&camera()).await;

    match h.coordinator.status(&camera()).await.unwrap() {
        BackupStatus::Failed(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].kind, BackupErrorKind::Request);
            assert!(!errors[0].retryable);
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(h.files.count_by_state(&camera()).await.unwrap().failed, 1);

    h.remote.failing_uris.lock().unwrap().clear();
    assert_eq!(h.coordinator.retry_failed(&camera()).await.unwrap(), 1);
    h.wait_completed(&camera()).await;

    assert!(h.remote.uploaded().contains(&bad.uri));
    assert_eq!(h.coordinator.status(&camera()).await.unwrap(), BackupStatus::Complete);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_failed_file_keeps_folder_failed_on_later_passes() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "bad.jpg", 1);
    let bad = item(CAMERA, "bad.jpg", 1);
    h.remote
        .fail_uri(&bad.uri, |_| BridgeError::InvalidRequest("corrupt".to_string()));

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_idle(&camera()).await;
    assert!(matches!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::Failed(_)
    ));

    // A clean pass over new media must not hide the file that never made it.
    h.media.add(CAMERA, "new.jpg", 2);
    h.coordinator
        .sync_folder(&camera(), core_backup::BACKUP_UPLOAD_PRIORITY)
        .await
        .unwrap();
    h.wait_idle(&camera()).await;

    assert_eq!(h.remote.uploaded(), vec![item(CAMERA, "new.jpg", 2).uri]);
    match h.coordinator.status(&camera()).await.unwrap() {
        BackupStatus::Failed(errors) => {
            assert!(errors.iter().any(|e| e.message.starts_with("bad.jpg")));
        }
        other => panic!("unexpected status {:?}", other),
    }
    let counts = h.files.count_by_state(&camera()).await.unwrap();
    assert_eq!(counts.failed, 1);
    // no cleanup ran, so the completed row is still there
    assert_eq!(counts.completed, 1);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_busy_media_store_is_scanned_again() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.media.failing_scans.store(1, Ordering::SeqCst);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.media.failing_scans.load(Ordering::SeqCst), 0);
    assert_eq!(h.remote.uploaded().len(), 1);
    assert_eq!(h.coordinator.status(&camera()).await.unwrap(), BackupStatus::Complete);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_own_interrupted_draft_is_replaced() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    let a = item(CAMERA, "a.jpg", 1);
    h.remote
        .put_draft(name_hash(CAMERA, &a.name, a.size), &test_settings().client_uid);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.remote.uploaded(), vec![a.uri]);
    assert_eq!(
        h.remote.replaced_drafts.lock().unwrap().clone(),
        vec!["draft-link".to_string()]
    );
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_transient_batch_failures_are_retried() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.remote.failing_batches.store(2, Ordering::SeqCst);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.remote.uploaded().len(), 1);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_folder() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.remote.failing_batches.store(10, Ordering::SeqCst);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    match h.wait_for(|e| matches!(e, BackupEvent::BackupFailed { .. })).await {
        BackupEvent::BackupFailed { folder_id, .. } => assert_eq!(folder_id, camera()),
        other => panic!("unexpected event {:?}", other),
    }
    h.wait_idle(&camera()).await;

    match h.coordinator.status(&camera()).await.unwrap() {
        BackupStatus::Failed(errors) => {
            assert_eq!(errors[0].kind, BackupErrorKind::Connectivity);
            assert!(errors[0].retryable);
        }
        other => panic!("unexpected status {:?}", other),
    }
    let counts = h.files.count_by_state(&camera()).await.unwrap();
    assert_eq!(counts.enqueued, 0);
    assert_eq!(counts.ready, 1);

    // Three attempts per pass: the first plus two retries.
    assert_eq!(h.remote.failing_batches.load(Ordering::SeqCst), 7);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_drive_quota_stops_backup_until_restarted() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    *h.remote.quota.lock().unwrap() = Quota { used: 500, max: 1_000 };

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    match h.wait_for(|e| matches!(e, BackupEvent::BackupStopped { .. })).await {
        BackupEvent::BackupStopped { user_id, reason } => {
            assert_eq!(user_id, USER);
            assert_eq!(reason, StopReason::DriveStorage);
        }
        other => panic!("unexpected event {:?}", other),
    }
    h.wait_idle(&camera()).await;

    assert_eq!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::Uncompleted(UncompletedReason::DriveStorage)
    );
    assert!(h.remote.uploaded().is_empty());

    // Further triggers stay blocked while the stop is recorded.
    h.coordinator.sync_folder(&camera(), 100).await.unwrap();
    h.wait_idle(&camera()).await;
    assert!(h.remote.uploaded().is_empty());

    *h.remote.quota.lock().unwrap() = Quota {
        used: 0,
        max: 1_000_000,
    };
    assert_eq!(h.coordinator.start_backup(USER).await.unwrap(), 1);
    h.wait_completed(&camera()).await;
    assert_eq!(h.remote.uploaded().len(), 1);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_upload_limit_holds_across_folders() {
    let mut settings = test_settings();
    settings.upload_limit_threshold = 2;
    let mut h = harness(settings).await;

    let screenshots = FolderId::new("share-1", "screenshots");
    for i in 0..6 {
        h.media.add(CAMERA, &format!("cam-{}.jpg", i), i);
        h.media.add(2, &format!("shot-{}.png", i), i);
    }

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.coordinator
        .enable_folder(USER, 2, screenshots.clone())
        .await
        .unwrap();
    h.wait_completed(&camera()).await;
    h.wait_idle(&screenshots).await;

    assert_eq!(h.remote.uploaded().len(), 12);
    assert!(h.remote.max_in_flight.load(Ordering::SeqCst) <= 2);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_network_stages_wait_for_connectivity() {
    let mut h = harness(test_settings()).await;
    h.network.set(NetworkInfo::disconnected());
    h.media.add(CAMERA, "a.jpg", 1);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_for(|e| matches!(e, BackupEvent::FolderScanned { .. })).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.remote.uploaded().is_empty());
    assert!(h.coordinator.is_folder_active(&camera()).await);
    assert!(matches!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::InProgress(_)
    ));

    h.network.set(NetworkInfo::connected(NetworkType::Cellular, true));
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_wifi_only_backup_skips_metered_networks() {
    let mut settings = test_settings();
    settings.wifi_only = true;
    let mut h = harness(settings).await;
    h.network.set(NetworkInfo::connected(NetworkType::Cellular, true));
    h.media.add(CAMERA, "a.jpg", 1);

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.remote.uploaded().is_empty());

    h.network.set(NetworkInfo::connected(NetworkType::WiFi, false));
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_disable_releases_files_in_flight() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.media.add(CAMERA, "b.jpg", 2);
    let _gate = h.remote.hold();

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_upload_started().await;

    h.coordinator.disable_folder(&camera()).await.unwrap();
    h.wait_for(|e| matches!(e, BackupEvent::BackupDisabled { .. })).await;

    assert!(!h.coordinator.is_folder_active(&camera()).await);
    let counts = h.files.count_by_state(&camera()).await.unwrap();
    assert_eq!(counts.enqueued, 0);
    assert_eq!(counts.ready, 2);
    assert_eq!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::Uncompleted(UncompletedReason::Disabled)
    );
    assert!(matches!(
        h.coordinator.sync_folder(&camera(), 100).await,
        Err(PipelineError::FolderDisabled { .. })
    ));

    // Re-enabling resumes from the stored rows.
    *h.remote.hold_uploads.lock().unwrap() = None;
    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_requested_stop_interrupts_without_blocking() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    let _gate = h.remote.hold();

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_upload_started().await;

    h.coordinator.stop_backup(USER, StopReason::Requested).await.unwrap();
    h.wait_for(|e| matches!(e, BackupEvent::BackupStopped { reason: StopReason::Requested, .. }))
        .await;
    h.wait_idle(&camera()).await;
    assert_eq!(h.files.count_by_state(&camera()).await.unwrap().enqueued, 0);

    *h.remote.hold_uploads.lock().unwrap() = None;
    h.coordinator.sync_folder(&camera(), 100).await.unwrap();
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_local_storage_stop_is_user_wide() {
    let mut h = harness(test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.network.set(NetworkInfo::disconnected());

    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_for(|e| matches!(e, BackupEvent::FolderScanned { .. })).await;
    h.coordinator
        .stop_backup(USER, StopReason::LocalStorage)
        .await
        .unwrap();
    h.wait_idle(&camera()).await;

    assert_eq!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::Uncompleted(UncompletedReason::LocalStorage)
    );

    h.network.set(NetworkInfo::connected(NetworkType::WiFi, false));
    h.coordinator.start_backup(USER).await.unwrap();
    h.wait_completed(&camera()).await;
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_stale_enqueued_rows_are_recovered() {
    let pool = create_test_pool().await.unwrap();
    let folders = SqliteBackupFolderRepository::new(pool.clone());
    let files = SqliteBackupFileRepository::new(pool.clone());

    // Rows left ENQUEUED by a process that died mid-upload.
    let folder = BackupFolder::new(USER, CAMERA, camera());
    folders.upsert(&folder).await.unwrap();
    folders.advance_watermark(&folder, 1).await.unwrap();
    let a = item(CAMERA, "a.jpg", 1);
    let row = core_backup::BackupFile::discovered(
        USER,
        &folder,
        &a,
        name_hash(CAMERA, &a.name, a.size),
        100,
    );
    let id = files.insert_batch(&[row]).await.unwrap()[0].id;
    files
        .transition(&[id], BackupFileState::Idle, BackupFileState::Ready)
        .await
        .unwrap();
    assert_eq!(files.mark_enqueued(&[id]).await.unwrap(), vec![id]);

    let mut h = harness_on(pool, test_settings()).await;
    h.coordinator.sync_folder(&camera(), 100).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.remote.uploaded(), vec![a.uri]);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_stale_rows_of_other_folders_do_not_hold_slots() {
    let pool = create_test_pool().await.unwrap();
    let folders = SqliteBackupFolderRepository::new(pool.clone());
    let files = SqliteBackupFileRepository::new(pool.clone());

    // A folder that is never synced again, with a full batch left in flight.
    let other = BackupFolder::new(USER, 9, FolderId::new("share-1", "other"));
    folders.upsert(&other).await.unwrap();
    let rows: Vec<_> = (0..5)
        .map(|i| {
            let stale = item(9, &format!("old-{}.jpg", i), i);
            core_backup::BackupFile::discovered(
                USER,
                &other,
                &stale,
                name_hash(9, &stale.name, stale.size),
                100,
            )
        })
        .collect();
    let ids: Vec<i64> = files
        .insert_batch(&rows)
        .await
        .unwrap()
        .iter()
        .map(|f| f.id)
        .collect();
    files
        .transition(&ids, BackupFileState::Idle, BackupFileState::Ready)
        .await
        .unwrap();
    assert_eq!(files.mark_enqueued(&ids).await.unwrap().len(), 5);

    let mut h = harness_on(pool, test_settings()).await;
    h.media.add(CAMERA, "a.jpg", 1);
    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_completed(&camera()).await;

    assert_eq!(h.remote.uploaded(), vec![item(CAMERA, "a.jpg", 1).uri]);
    let counts = h.files.count_by_state(&other.folder_id).await.unwrap();
    assert_eq!(counts.enqueued, 0);
    assert_eq!(counts.ready, 5);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_unknown_and_removed_folders() {
    let mut h = harness(test_settings()).await;
    assert!(matches!(
        h.coordinator.sync_folder(&camera(), 100).await,
        Err(PipelineError::FolderNotFound { .. })
    ));
    assert!(matches!(
        h.coordinator.disable_folder(&camera()).await,
        Err(PipelineError::FolderNotFound { .. })
    ));

    h.media.add(CAMERA, "a.jpg", 1);
    h.remote
        .fail_uri("content://media/1/a.jpg", |_| BridgeError::Unauthorized("denied".to_string()));
    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.wait_idle(&camera()).await;
    assert!(matches!(
        h.coordinator.status(&camera()).await.unwrap(),
        BackupStatus::Failed(_)
    ));

    h.coordinator.remove_folder(&camera()).await.unwrap();
    assert!(matches!(
        h.coordinator.status(&camera()).await,
        Err(PipelineError::FolderNotFound { .. })
    ));
    assert_eq!(h.files.count_by_state(&camera()).await.unwrap().total(), 0);
    h.coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    let h = harness(test_settings()).await;
    h.coordinator.enable_folder(USER, CAMERA, camera()).await.unwrap();
    h.coordinator.shutdown().await;

    assert!(matches!(
        h.coordinator.sync_folder(&camera(), 100).await,
        Err(PipelineError::Cancelled)
    ));
}
