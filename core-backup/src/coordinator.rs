//! # Backup Coordinator
//!
//! Runs the backup pipeline for every enabled remote folder.
//!
//! ## Overview
//!
//! Each [`FolderId`] owns one worker task, so units targeting the same folder
//! never overlap while different folders proceed in parallel. A worker waits
//! for a trigger, then runs one pass over every enabled bucket of its folder:
//!
//! 1. Scan the bucket for media newer than its watermark
//! 2. Find duplicate candidates by name hash (network)
//! 3. Confirm candidates by content digest
//! 4. Upload READY files, batch after batch, under the global slot limit (network)
//! 5. Purge terminal rows once the folder is complete
//!
//! Triggers arriving while a pass is queued are merged into it. Before every
//! stage the worker checks that the folder is still enabled and that backup is
//! not stopped for the user; every stage is cancellable.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = BackupCoordinator::from_config(&config, EventBus::default()).await?;
//! coordinator.enable_folder("user", bucket_id, FolderId::new(share, link)).await?;
//!
//! let status = coordinator.status(&folder_id).await?;
//! coordinator.shutdown().await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::{Clock, FolderId, NetworkMonitor, TaskConstraints};
use core_runtime::events::{BackupEvent, EventBus, StopReason};
use core_runtime::logging::mask_id;
use core_runtime::{BackupSettings, CoreConfig};
use futures::future::join_all;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, Notify, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{ErrorClassifier, ErrorScope};
use crate::db::{create_pool, DatabaseConfig};
use crate::duplicates::DuplicateDetector;
use crate::error::{PipelineError, Result};
use crate::models::{BackupErrorKind, BackupFolder, BACKUP_UPLOAD_PRIORITY};
use crate::repositories::{
    BackupDuplicateRepository, BackupErrorRepository, BackupFileRepository,
    BackupFolderRepository, SqliteBackupDuplicateRepository, SqliteBackupErrorRepository,
    SqliteBackupFileRepository, SqliteBackupFolderRepository,
};
use crate::scanner::BucketScanner;
use crate::status::{BackupStatus, StatusAggregator};
use crate::uploader::UploadScheduler;

/// What happened to a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A new pass was queued
    Scheduled,
    /// Merged into a pass that was already queued
    Coalesced,
}

/// Pending pass of a folder worker plus the token of the pass in progress
struct FolderTrigger {
    pending: Mutex<Option<i64>>,
    notify: Notify,
    running: AtomicBool,
    current_run: Mutex<Option<CancellationToken>>,
}

impl FolderTrigger {
    fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            current_run: Mutex::new(None),
        }
    }

    /// Queue a pass; a queued pass keeps the most urgent priority.
    async fn schedule(&self, priority: i64) -> SyncTrigger {
        let mut pending = self.pending.lock().await;
        match pending.as_mut() {
            Some(queued) => {
                *queued = (*queued).min(priority);
                SyncTrigger::Coalesced
            }
            None => {
                *pending = Some(priority);
                self.notify.notify_one();
                SyncTrigger::Scheduled
            }
        }
    }

    /// Wait for a queued pass and mark it running under a child of `parent`.
    async fn next(&self, parent: &CancellationToken) -> (i64, CancellationToken) {
        loop {
            {
                let mut pending = self.pending.lock().await;
                if let Some(priority) = pending.take() {
                    let run = parent.child_token();
                    *self.current_run.lock().await = Some(run.clone());
                    self.running.store(true, Ordering::SeqCst);
                    return (priority, run);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn finish(&self) {
        self.current_run.lock().await.take();
        self.running.store(false, Ordering::SeqCst);
    }

    async fn is_active(&self) -> bool {
        let pending = self.pending.lock().await;
        pending.is_some() || self.running.load(Ordering::SeqCst)
    }

    /// Drop the queued pass and cancel the one in progress.
    async fn interrupt(&self) {
        self.pending.lock().await.take();
        if let Some(run) = self.current_run.lock().await.as_ref() {
            run.cancel();
        }
    }
}

struct FolderWorker {
    trigger: Arc<FolderTrigger>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-pass context shared by the stages
struct PassContext<'a> {
    user_id: &'a str,
    folder_id: &'a FolderId,
    priority: i64,
    cancel: &'a CancellationToken,
}

/// Backup coordinator owning one worker per remote folder
pub struct BackupCoordinator {
    settings: BackupSettings,
    events: EventBus,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,

    folders: Arc<dyn BackupFolderRepository>,
    files: Arc<dyn BackupFileRepository>,
    duplicates: Arc<dyn BackupDuplicateRepository>,
    errors: Arc<dyn BackupErrorRepository>,

    scanner: Arc<BucketScanner>,
    detector: Arc<DuplicateDetector>,
    uploader: Arc<UploadScheduler>,
    classifier: Arc<ErrorClassifier>,
    status: Arc<StatusAggregator>,

    workers: Arc<Mutex<HashMap<FolderId, FolderWorker>>>,
    /// Set once rows left ENQUEUED by a previous process are released
    recovered: Arc<OnceCell<()>>,
    shutdown: CancellationToken,
}

impl BackupCoordinator {
    /// Create a coordinator over an existing pool with the backup schema applied.
    pub fn new(config: &CoreConfig, pool: SqlitePool, events: EventBus) -> Self {
        let settings = config.settings.clone();

        let folders: Arc<dyn BackupFolderRepository> =
            Arc::new(SqliteBackupFolderRepository::new(pool.clone()));
        let files: Arc<dyn BackupFileRepository> =
            Arc::new(SqliteBackupFileRepository::new(pool.clone()));
        let duplicates: Arc<dyn BackupDuplicateRepository> =
            Arc::new(SqliteBackupDuplicateRepository::new(pool.clone()));
        let errors: Arc<dyn BackupErrorRepository> =
            Arc::new(SqliteBackupErrorRepository::new(pool));

        let scanner = Arc::new(BucketScanner::new(
            config.media_source.clone(),
            folders.clone(),
            files.clone(),
        ));
        let detector = Arc::new(
            DuplicateDetector::new(
                config.remote_store.clone(),
                config.content_hasher.clone(),
                files.clone(),
                duplicates.clone(),
                settings.client_uid.clone(),
            )
            .with_hash_batch_size(settings.hash_batch_size),
        );
        let uploader = Arc::new(UploadScheduler::new(
            config.remote_store.clone(),
            config.device_storage.clone(),
            files.clone(),
            settings.clone(),
        ));
        let classifier = Arc::new(ErrorClassifier::new(
            files.clone(),
            errors.clone(),
            events.clone(),
            settings.clone(),
            config.clock.clone(),
        ));
        let status = Arc::new(StatusAggregator::new(
            folders.clone(),
            files.clone(),
            errors.clone(),
        ));

        Self {
            settings,
            events,
            network_monitor: config.network_monitor.clone(),
            clock: config.clock.clone(),
            folders,
            files,
            duplicates,
            errors,
            scanner,
            detector,
            uploader,
            classifier,
            status,
            workers: Arc::new(Mutex::new(HashMap::new())),
            recovered: Arc::new(OnceCell::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Open the database named by `config` and create a coordinator over it.
    pub async fn from_config(config: &CoreConfig, events: EventBus) -> Result<Self> {
        config.validate()?;
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        Ok(Self::new(config, pool, events))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Pair a bucket with a remote folder (or re-enable the pairing) and queue a pass.
    #[instrument(skip(self), fields(user_id = %mask_id(user_id)))]
    pub async fn enable_folder(
        &self,
        user_id: &str,
        bucket_id: i64,
        folder_id: FolderId,
    ) -> Result<SyncTrigger> {
        self.folders
            .upsert(&BackupFolder::new(user_id, bucket_id, folder_id.clone()))
            .await?;
        info!(%folder_id, bucket_id, "Backup enabled");
        self.sync_folder(&folder_id, BACKUP_UPLOAD_PRIORITY).await
    }

    /// Switch backup off for a folder, cancelling its worker.
    ///
    /// Returns once the worker has exited and no file of the folder is ENQUEUED.
    #[instrument(skip(self))]
    pub async fn disable_folder(&self, folder_id: &FolderId) -> Result<()> {
        if self.folders.set_enabled(folder_id, false).await? == 0 {
            return Err(PipelineError::FolderNotFound {
                folder_id: folder_id.to_string(),
            });
        }

        let worker = self.workers.lock().await.remove(folder_id);
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "Folder worker ended abnormally");
            }
        }

        let reset = self.files.reset_enqueued_for_folder(folder_id).await?;
        info!(reset, "Backup disabled");
        self.events.emit_backup(BackupEvent::BackupDisabled {
            folder_id: folder_id.clone(),
        });
        Ok(())
    }

    /// Disable a folder and delete every record belonging to it.
    #[instrument(skip(self))]
    pub async fn remove_folder(&self, folder_id: &FolderId) -> Result<()> {
        self.disable_folder(folder_id).await?;

        let files = self.files.delete_by_folder(folder_id).await?;
        let duplicates = self.duplicates.delete_by_folder(folder_id).await?;
        let errors = self.errors.clear_folder(folder_id).await?;
        self.folders.delete_by_folder(folder_id).await?;

        info!(files, duplicates, errors, "Backup folder removed");
        Ok(())
    }

    /// Queue a pass for a folder. Lower `priority` values are more urgent.
    #[instrument(skip(self))]
    pub async fn sync_folder(&self, folder_id: &FolderId, priority: i64) -> Result<SyncTrigger> {
        if self.shutdown.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let buckets = self.folders.find_by_folder(folder_id).await?;
        if buckets.is_empty() {
            return Err(PipelineError::FolderNotFound {
                folder_id: folder_id.to_string(),
            });
        }
        if !buckets.iter().any(|b| b.enabled) {
            return Err(PipelineError::FolderDisabled {
                folder_id: folder_id.to_string(),
            });
        }

        let mut workers = self.workers.lock().await;
        if let Some(worker) = workers.get(folder_id) {
            let trigger = worker.trigger.schedule(priority).await;
            debug!(?trigger, "Folder pass requested");
            return Ok(trigger);
        }

        // Before the first worker starts, anything ENQUEUED in any folder was
        // left by a previous process and would otherwise hold upload slots.
        self.recovered
            .get_or_try_init(|| async {
                let stale = self.files.reset_enqueued_all().await?;
                if stale > 0 {
                    info!(stale, "Released files left in flight by a previous run");
                }
                Ok::<_, PipelineError>(())
            })
            .await?;

        let trigger = Arc::new(FolderTrigger::new());
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(self.clone_for_task().run_worker(
            folder_id.clone(),
            trigger.clone(),
            cancel.clone(),
        ));
        let scheduled = trigger.schedule(priority).await;

        workers.insert(
            folder_id.clone(),
            FolderWorker {
                trigger,
                cancel,
                handle,
            },
        );
        debug!("Folder worker started");
        Ok(scheduled)
    }

    /// Clear user-wide errors, release FAILED files and queue every enabled folder.
    ///
    /// Returns the number of folders queued.
    #[instrument(skip(self), fields(user_id = %mask_id(user_id)))]
    pub async fn start_backup(&self, user_id: &str) -> Result<usize> {
        let cleared = self.errors.clear_user(user_id).await?;
        self.events.emit_backup(BackupEvent::BackupStarted {
            user_id: user_id.to_string(),
        });

        let mut folder_ids: Vec<FolderId> = self
            .folders
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|f| f.enabled)
            .map(|f| f.folder_id)
            .collect();
        folder_ids.dedup();

        for folder_id in &folder_ids {
            let released = self.files.retry_failed(folder_id).await?;
            if released > 0 {
                debug!(%folder_id, released, "Failed files released");
            }
            self.sync_folder(folder_id, BACKUP_UPLOAD_PRIORITY).await?;
        }

        info!(cleared, folders = folder_ids.len(), "Backup started");
        Ok(folder_ids.len())
    }

    /// Halt backup for every folder of a user.
    ///
    /// A storage reason is persisted and blocks further passes until
    /// [`start_backup`](Self::start_backup); a requested stop only ends the
    /// passes in progress.
    #[instrument(skip(self), fields(user_id = %mask_id(user_id)))]
    pub async fn stop_backup(&self, user_id: &str, reason: StopReason) -> Result<()> {
        let kind = match reason {
            StopReason::LocalStorage => Some(BackupErrorKind::LocalStorage),
            StopReason::DriveStorage => Some(BackupErrorKind::DriveStorage),
            StopReason::Requested => None,
        };
        if let Some(kind) = kind {
            self.errors
                .record(
                    user_id,
                    None,
                    kind,
                    false,
                    "Backup stopped: not enough storage",
                    self.clock.unix_timestamp(),
                )
                .await?;
        }

        let folder_ids: Vec<FolderId> = self
            .folders
            .find_by_user(user_id)
            .await?
            .into_iter()
            .map(|f| f.folder_id)
            .collect();
        {
            let workers = self.workers.lock().await;
            for folder_id in &folder_ids {
                if let Some(worker) = workers.get(folder_id) {
                    worker.trigger.interrupt().await;
                }
            }
        }

        let reset = self.files.reset_enqueued_for_user(user_id).await?;
        warn!(?reason, reset, "Backup stopped");
        self.events.emit_backup(BackupEvent::BackupStopped {
            user_id: user_id.to_string(),
            reason,
        });
        Ok(())
    }

    /// Move FAILED files of a folder back to READY, clear its errors and queue a pass.
    #[instrument(skip(self))]
    pub async fn retry_failed(&self, folder_id: &FolderId) -> Result<u64> {
        let released = self.files.retry_failed(folder_id).await?;
        self.errors.clear_folder(folder_id).await?;
        self.sync_folder(folder_id, BACKUP_UPLOAD_PRIORITY).await?;
        info!(released, "Retrying failed files");
        Ok(released)
    }

    pub async fn status(&self, folder_id: &FolderId) -> Result<BackupStatus> {
        self.status.status(folder_id).await
    }

    /// Whether a pass is running or queued for the folder
    pub async fn is_folder_active(&self, folder_id: &FolderId) -> bool {
        let trigger = match self.workers.lock().await.get(folder_id) {
            Some(worker) => worker.trigger.clone(),
            None => return false,
        };
        trigger.is_active().await
    }

    /// Cancel every worker and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .await
            .drain()
            .map(|(_, worker)| worker.handle)
            .collect();

        let workers = handles.len();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Folder worker ended abnormally");
            }
        }
        info!(workers, "Backup coordinator shut down");
    }

    async fn run_worker(
        self,
        folder_id: FolderId,
        trigger: Arc<FolderTrigger>,
        cancel: CancellationToken,
    ) {
        loop {
            let (priority, run) = tokio::select! {
                _ = cancel.cancelled() => break,
                next = trigger.next(&cancel) => next,
            };

            let result = self.run_pass(&folder_id, priority, &run).await;
            trigger.finish().await;

            match result {
                Ok(()) => {}
                Err(e) if e.is_interruption() => debug!(%folder_id, error = %e, "Pass interrupted"),
                Err(e) => error!(%folder_id, error = %e, "Pass failed"),
            }
        }
        debug!(%folder_id, "Folder worker stopped");
    }

    #[instrument(skip(self, cancel), fields(folder_id = %folder_id))]
    async fn run_pass(
        &self,
        folder_id: &FolderId,
        priority: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let buckets: Vec<BackupFolder> = self
            .folders
            .find_by_folder(folder_id)
            .await?
            .into_iter()
            .filter(|b| b.enabled)
            .collect();
        let Some(user_id) = buckets.first().map(|b| b.user_id.clone()) else {
            return Ok(());
        };

        let ctx = PassContext {
            user_id: &user_id,
            folder_id,
            priority,
            cancel,
        };

        match self.run_stages(&ctx, &buckets).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if matches!(e, PipelineError::Cancelled) {
                    self.files.reset_enqueued_for_folder(folder_id).await?;
                } else if !e.is_interruption() {
                    if let Err(handle_err) = self
                        .classifier
                        .handle(ErrorScope::folder(&user_id, folder_id), &e)
                        .await
                    {
                        error!(error = %handle_err, "Failed to record backup failure");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, ctx: &PassContext<'_>, buckets: &[BackupFolder]) -> Result<()> {
        let mut file_failures = 0;

        for bucket in buckets {
            let scanner = &self.scanner;
            let new_files = self
                .stage(
                    ctx,
                    self.classifier.retry("scan", ctx.cancel, move |_| {
                        scanner.scan(ctx.user_id, bucket, ctx.priority)
                    }),
                )
                .await?;
            if !new_files.is_empty() {
                self.events.emit_backup(BackupEvent::FolderScanned {
                    folder_id: ctx.folder_id.clone(),
                    bucket_id: bucket.bucket_id,
                    new_files: new_files.len() as u64,
                });
            }

            let detector = &self.detector;
            self.stage(
                ctx,
                self.classifier.retry("find duplicates", ctx.cancel, move |_| async move {
                    self.wait_for_network(ctx.cancel).await?;
                    detector.find_duplicates(bucket).await
                }),
            )
            .await?;

            self.stage(ctx, self.detector.check_duplicates(ctx.user_id, bucket))
                .await?;
            self.emit_counts(ctx.folder_id).await?;

            file_failures += self.upload_bucket(ctx, bucket).await?;
        }

        // Errors of FAILED files stay until those files are released.
        let failed = self.files.count_by_state(ctx.folder_id).await?.failed;
        if file_failures == 0 && failed == 0 {
            self.errors.clear_folder(ctx.folder_id).await?;
        }
        if self.status.cleanup(ctx.folder_id).await?.is_some() {
            self.events.emit_backup(BackupEvent::FolderCompleted {
                folder_id: ctx.folder_id.clone(),
            });
        }
        Ok(())
    }

    /// Upload READY files of a bucket until none is left. Returns the number of
    /// files that failed for good.
    async fn upload_bucket(&self, ctx: &PassContext<'_>, bucket: &BackupFolder) -> Result<usize> {
        let mut failures = 0;
        let mut stalled: u32 = 0;
        let uploader = &self.uploader;

        loop {
            let outcome = self
                .stage(
                    ctx,
                    self.classifier.retry("upload", ctx.cancel, move |_| async move {
                        self.wait_for_network(ctx.cancel).await?;
                        uploader.upload_folder(bucket).await
                    }),
                )
                .await?;

            for failure in &outcome.failures {
                self.errors
                    .record(
                        ctx.user_id,
                        Some(ctx.folder_id),
                        failure.kind,
                        false,
                        &format!("{}: {}", failure.name, failure.message),
                        self.clock.unix_timestamp(),
                    )
                    .await?;
            }
            failures += outcome.failures.len();

            if outcome.enqueued > 0 {
                self.emit_counts(ctx.folder_id).await?;
            }
            if outcome.remaining_ready == 0 {
                return Ok(failures);
            }

            let progressed = outcome.completed + outcome.removed + outcome.failures.len() as u64;
            if outcome.enqueued > 0 && progressed == 0 {
                // Every file of the batch came back with a transient failure.
                stalled += 1;
                if stalled > self.settings.max_api_auto_retries {
                    return Err(PipelineError::RetriesExhausted {
                        operation: "upload".to_string(),
                        attempts: stalled,
                        source: Box::new(PipelineError::InvalidState(format!(
                            "{} files requeued without progress",
                            outcome.requeued
                        ))),
                    });
                }
                // backoff_for takes the number of the attempt about to run
                let next_attempt = stalled + 1;
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(self.settings.backoff_for(next_attempt)) => {}
                }
                continue;
            }
            stalled = 0;

            if outcome.enqueued == 0 {
                // Every slot is taken by other folders.
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(self.settings.slot_wait()) => {}
                }
            }
        }
    }

    /// Run one stage if the folder may still proceed, aborting on cancellation.
    async fn stage<T, F>(&self, ctx: &PassContext<'_>, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.ensure_active(ctx).await?;

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(PipelineError::Cancelled),
            result = work => result,
        }
    }

    async fn ensure_active(&self, ctx: &PassContext<'_>) -> Result<()> {
        let buckets = self.folders.find_by_folder(ctx.folder_id).await?;
        if !buckets.iter().any(|b| b.enabled) {
            return Err(PipelineError::FolderDisabled {
                folder_id: ctx.folder_id.to_string(),
            });
        }

        let stopped = self
            .errors
            .find_for_user(ctx.user_id)
            .await?
            .iter()
            .any(|e| e.kind.is_resource());
        if stopped {
            return Err(PipelineError::BackupStopped {
                user_id: ctx.user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Wait until the network satisfies the backup constraints. Without a
    /// monitor the device is assumed online.
    async fn wait_for_network(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(monitor) = &self.network_monitor else {
            return Ok(());
        };
        let constraints = TaskConstraints {
            requires_network: true,
            requires_unmetered: self.settings.wifi_only,
        };

        let mut waiting = false;
        loop {
            match monitor.get_network_info().await {
                Ok(info) if constraints.satisfied_by(&info) => {
                    if waiting {
                        info!("Network available, resuming");
                    }
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Network state unavailable"),
            }

            if !waiting {
                info!(wifi_only = self.settings.wifi_only, "Waiting for network");
                waiting = true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(self.settings.network_poll_interval()) => {}
            }
        }
    }

    async fn emit_counts(&self, folder_id: &FolderId) -> Result<()> {
        let counts = self.status.counts(folder_id).await?;
        self.events.emit_backup(BackupEvent::FileCountChanged {
            folder_id: folder_id.clone(),
            pending: counts.pending(),
            completed: counts.completed,
            duplicated: counts.duplicated,
            failed: counts.failed,
        });
        Ok(())
    }

    /// Clone coordinator for spawning into a worker task
    fn clone_for_task(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            events: self.events.clone(),
            network_monitor: self.network_monitor.clone(),
            clock: self.clock.clone(),
            folders: self.folders.clone(),
            files: self.files.clone(),
            duplicates: self.duplicates.clone(),
            errors: self.errors.clone(),
            scanner: self.scanner.clone(),
            detector: self.detector.clone(),
            uploader: self.uploader.clone(),
            classifier: self.classifier.clone(),
            status: self.status.clone(),
            workers: self.workers.clone(),
            recovered: self.recovered.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}
