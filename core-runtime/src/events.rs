//! # Event Bus System
//!
//! Broadcasts backup progress to hosts (notifications, UI) over
//! `tokio::sync::broadcast`. Producers never block on slow subscribers.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wrapping domain enums ([`BackupEvent`])
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::FolderId;
//! use core_runtime::events::{BackupEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Backup(BackupEvent::FolderCompleted {
//!         folder_id: FolderId::new("share", "link"),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Folder backup completed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber missed `n` events. Non-fatal; counts
//!   are re-sent on the next change so a lagging UI catches up.
//! - **`RecvError::Closed`**: All senders were dropped. Treat as shutdown.

use bridge_traits::FolderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Backup pipeline events
    Backup(BackupEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Backup(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Backup(BackupEvent::BackupFailed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::BackupStopped { .. }) => EventSeverity::Warning,
            CoreEvent::Backup(BackupEvent::FolderCompleted { .. })
            | CoreEvent::Backup(BackupEvent::BackupStarted { .. })
            | CoreEvent::Backup(BackupEvent::BackupDisabled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Backup Events
// ============================================================================

/// Reason category shown to the user when a backup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    Network,
    Storage,
    Other,
}

/// Why backup was halted for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// Device has too little free space to stage uploads
    LocalStorage,
    /// Remote quota would be exceeded
    DriveStorage,
    /// Host or user asked to stop
    Requested,
}

/// Events emitted by the backup pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackupEvent {
    /// Backup (re)started for a user; previous user-level errors were cleared.
    BackupStarted { user_id: String },
    /// A bucket scan persisted new files.
    FolderScanned {
        folder_id: FolderId,
        bucket_id: i64,
        new_files: u64,
    },
    /// File-state counts of a folder changed.
    FileCountChanged {
        folder_id: FolderId,
        /// Files still waiting for dedup or upload
        pending: u64,
        completed: u64,
        duplicated: u64,
        failed: u64,
    },
    /// Every file of the folder is uploaded or deduplicated.
    FolderCompleted { folder_id: FolderId },
    /// A stage gave up on a folder.
    BackupFailed {
        folder_id: FolderId,
        category: FailureCategory,
        message: String,
    },
    /// Backup was halted for every folder of a user.
    BackupStopped { user_id: String, reason: StopReason },
    /// Backup was switched off for a folder.
    BackupDisabled { folder_id: FolderId },
}

impl BackupEvent {
    fn description(&self) -> &str {
        match self {
            BackupEvent::BackupStarted { .. } => "Backup started",
            BackupEvent::FolderScanned { .. } => "Folder scanned",
            BackupEvent::FileCountChanged { .. } => "Backup file counts changed",
            BackupEvent::FolderCompleted { .. } => "Folder backup completed",
            BackupEvent::BackupFailed { .. } => "Folder backup failed",
            BackupEvent::BackupStopped { .. } => "Backup stopped",
            BackupEvent::BackupDisabled { .. } => "Folder backup disabled",
        }
    }

    /// Folder the event refers to, if it is folder-scoped.
    pub fn folder_id(&self) -> Option<&FolderId> {
        match self {
            BackupEvent::FolderScanned { folder_id, .. }
            | BackupEvent::FileCountChanged { folder_id, .. }
            | BackupEvent::FolderCompleted { folder_id }
            | BackupEvent::BackupFailed { folder_id, .. }
            | BackupEvent::BackupDisabled { folder_id } => Some(folder_id),
            BackupEvent::BackupStarted { .. } | BackupEvent::BackupStopped { .. } => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Clone it freely; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Shorthand for emitting a [`BackupEvent`] when nobody needs the result.
    pub fn emit_backup(&self, event: BackupEvent) {
        let _ = self.sender.send(CoreEvent::Backup(event));
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use bridge_traits::FolderId;
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let watched = FolderId::new("share", "camera");
/// let stream = EventStream::new(event_bus.subscribe()).filter(move |event| {
///     let CoreEvent::Backup(backup) = event;
///     backup.folder_id() == Some(&watched)
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
