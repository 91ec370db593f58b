//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the backup core:
//! - Logging and tracing initialisation
//! - Configuration (`CoreConfig`, `BackupSettings`)
//! - Event bus for progress and failure notifications
//!
//! ## Overview
//!
//! Nothing in this crate knows about the backup state machine. It establishes
//! the conventions `core-backup` builds on: how bridges are injected, how
//! logs are emitted, and how hosts observe progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BackupSettings, CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{BackupEvent, CoreEvent, EventBus, FailureCategory, StopReason};
