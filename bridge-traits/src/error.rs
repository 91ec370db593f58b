use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by remote, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Remote returned {status}: {message}")]
    Server {
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Remote storage quota exceeded")]
    QuotaExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Remote conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient local storage: {available} bytes available, {required} required")]
    InsufficientLocalStorage { available: u64, required: u64 },
}

impl BridgeError {
    /// Whether the failure is transient at the transport level.
    ///
    /// This is only the raw signal; attempt budgets are applied by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Network(_) | BridgeError::Timeout(_) | BridgeError::RateLimited { .. } => {
                true
            }
            BridgeError::Server {
                status, retryable, ..
            } => *retryable || *status >= 500,
            BridgeError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
