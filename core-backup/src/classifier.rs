//! # Error & Retry Classifier
//!
//! Maps pipeline failures onto the [`BackupErrorKind`] taxonomy, drives the
//! bounded retry loop of network stages and records failures that survive it.
//!
//! | Failure | Kind | Retryable |
//! |---------|------|-----------|
//! | network, timeout, transient I/O | Connectivity | yes |
//! | rate limiting, 5xx or flagged server response | Request | yes |
//! | other server response, malformed request, conflict | Request | no |
//! | authentication | Permission | no |
//! | remote quota | DriveStorage | no |
//! | device storage | LocalStorage | no |
//! | anything else | Other | no |
//!
//! Resource kinds stop backup for the whole user instead of a single folder.

use std::future::Future;
use std::sync::Arc;

use bridge_traits::{BridgeError, Clock, FolderId};
use core_runtime::events::{BackupEvent, EventBus, StopReason};
use core_runtime::BackupSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{PipelineError, Result};
use crate::models::{BackupError, BackupErrorKind, StorageKind};
use crate::repositories::{BackupErrorRepository, BackupFileRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: BackupErrorKind,
    pub retryable: bool,
}

impl Classification {
    fn retryable(kind: BackupErrorKind) -> Self {
        Self {
            kind,
            retryable: true,
        }
    }

    fn fatal(kind: BackupErrorKind) -> Self {
        Self {
            kind,
            retryable: false,
        }
    }
}

pub fn classify(error: &PipelineError) -> Classification {
    match error {
        PipelineError::Bridge(bridge) => classify_bridge(bridge),
        PipelineError::InsufficientStorage { kind, .. } => Classification::fatal(match kind {
            StorageKind::Local => BackupErrorKind::LocalStorage,
            StorageKind::Drive => BackupErrorKind::DriveStorage,
        }),
        // Enumeration is retried unless the device itself is out of space.
        PipelineError::Enumeration { source, .. } => {
            let inner = classify_bridge(source);
            if inner.kind.is_resource() {
                inner
            } else {
                Classification::retryable(inner.kind)
            }
        }
        // Exhausted retries are fatal for the operation, but the cause stays
        // retryable for a later pass.
        PipelineError::RetriesExhausted { source, .. } => {
            Classification::retryable(classify(source).kind)
        }
        _ => Classification::fatal(BackupErrorKind::Other),
    }
}

fn classify_bridge(error: &BridgeError) -> Classification {
    match error {
        BridgeError::Network(_) | BridgeError::Timeout(_) => {
            Classification::retryable(BackupErrorKind::Connectivity)
        }
        BridgeError::Io(_) if error.is_transient() => {
            Classification::retryable(BackupErrorKind::Connectivity)
        }
        BridgeError::RateLimited { .. } => Classification::retryable(BackupErrorKind::Request),
        BridgeError::Server { .. } if error.is_transient() => {
            Classification::retryable(BackupErrorKind::Request)
        }
        BridgeError::Server { .. }
        | BridgeError::InvalidRequest(_)
        | BridgeError::Conflict(_)
        | BridgeError::NotFound(_) => Classification::fatal(BackupErrorKind::Request),
        BridgeError::Unauthorized(_) => Classification::fatal(BackupErrorKind::Permission),
        BridgeError::QuotaExceeded => Classification::fatal(BackupErrorKind::DriveStorage),
        BridgeError::InsufficientLocalStorage { .. } => {
            Classification::fatal(BackupErrorKind::LocalStorage)
        }
        _ => Classification::fatal(BackupErrorKind::Other),
    }
}

/// Who a failure is recorded against
#[derive(Debug, Clone, Copy)]
pub struct ErrorScope<'a> {
    pub user_id: &'a str,
    pub folder_id: Option<&'a FolderId>,
}

impl<'a> ErrorScope<'a> {
    pub fn user(user_id: &'a str) -> Self {
        Self {
            user_id,
            folder_id: None,
        }
    }

    pub fn folder(user_id: &'a str, folder_id: &'a FolderId) -> Self {
        Self {
            user_id,
            folder_id: Some(folder_id),
        }
    }
}

pub struct ErrorClassifier {
    files: Arc<dyn BackupFileRepository>,
    errors: Arc<dyn BackupErrorRepository>,
    events: EventBus,
    settings: BackupSettings,
    clock: Arc<dyn Clock>,
}

impl ErrorClassifier {
    pub fn new(
        files: Arc<dyn BackupFileRepository>,
        errors: Arc<dyn BackupErrorRepository>,
        events: EventBus,
        settings: BackupSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            files,
            errors,
            events,
            settings,
            clock,
        }
    }

    /// Whether a failure on `attempt` (1-based) should be followed by another attempt.
    pub fn should_retry(&self, error: &PipelineError, attempt: u32) -> bool {
        if error.is_interruption() || matches!(error, PipelineError::RetriesExhausted { .. }) {
            return false;
        }
        classify(error).retryable && attempt <= self.settings.max_api_auto_retries
    }

    /// Run `operation` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// The attempt number is passed to the closure. Backoff sleeps end early
    /// with [`PipelineError::Cancelled`] when `cancel` fires.
    pub async fn retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut run: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let delay = self.settings.backoff_for(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let error = match run(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if self.should_retry(&error, attempt) {
                warn!(operation, attempt, error = %error, "Retrying after failure");
                attempt += 1;
                continue;
            }

            let exhausted = classify(&error).retryable
                && !error.is_interruption()
                && !matches!(error, PipelineError::RetriesExhausted { .. });
            if exhausted {
                return Err(PipelineError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
            return Err(error);
        }
    }

    /// Record a failure and release whatever it left in flight.
    ///
    /// Interruptions are not failures and are ignored. Resource failures are
    /// recorded against the user and stop backup for all of their folders.
    pub async fn handle(
        &self,
        scope: ErrorScope<'_>,
        error: &PipelineError,
    ) -> Result<Option<BackupError>> {
        if error.is_interruption() {
            debug!(error = %error, "Interruption is not recorded");
            return Ok(None);
        }

        let classification = classify(error);
        let message = error.to_string();
        let now = self.clock.unix_timestamp();

        if classification.kind.is_resource() {
            let recorded = self
                .errors
                .record(scope.user_id, None, classification.kind, false, &message, now)
                .await?;
            let reset = self.files.reset_enqueued_for_user(scope.user_id).await?;

            error!(
                kind = classification.kind.as_str(),
                reset,
                error = %error,
                "Backup stopped for lack of storage"
            );

            let reason = match classification.kind {
                BackupErrorKind::LocalStorage => StopReason::LocalStorage,
                _ => StopReason::DriveStorage,
            };
            self.events.emit_backup(BackupEvent::BackupStopped {
                user_id: scope.user_id.to_string(),
                reason,
            });
            return Ok(Some(recorded));
        }

        let recorded = self
            .errors
            .record(
                scope.user_id,
                scope.folder_id,
                classification.kind,
                classification.retryable,
                &message,
                now,
            )
            .await?;

        let reset = match scope.folder_id {
            Some(folder_id) => self.files.reset_enqueued_for_folder(folder_id).await?,
            None => self.files.reset_enqueued_for_user(scope.user_id).await?,
        };

        warn!(
            kind = classification.kind.as_str(),
            retryable = classification.retryable,
            reset,
            error = %error,
            "Backup failure recorded"
        );

        if let Some(folder_id) = scope.folder_id {
            self.events.emit_backup(BackupEvent::BackupFailed {
                folder_id: folder_id.clone(),
                category: classification.kind.category(),
                message,
            });
        }

        Ok(Some(recorded))
    }
}
