use bridge_traits::error::BridgeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Repository not found: {0}")]
    RepositoryMissing(String),

    #[error("Rate limited, retry in {wait_secs} seconds")]
    RateLimited { wait_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Aborted after fatal error during {stage}: {message}")]
    FatalProcess { stage: String, message: String },

    #[error("A sync is already running")]
    AlreadyRunning,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl SyncError {
    /// Whether this error ends the run.
    ///
    /// Only rate limiting is survivable at the orchestrator level: the chunk is
    /// rescheduled after the wait. Transient network and server failures have
    /// already been retried by the HTTP layer when they get here.
    pub fn is_terminal(&self) -> bool {
        self.retry_after().is_none()
    }

    /// How long the chunk that hit this error waits before running again.
    /// `None` for terminal errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { wait_secs } => Some(Duration::from_secs((*wait_secs).max(1))),
            _ => None,
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Unauthorized(message) => SyncError::Auth(message),
            BridgeError::NotFound(message) => SyncError::RepositoryMissing(message),
            BridgeError::RepositoryEmpty => {
                SyncError::Provider("Repository is empty".to_string())
            }
            BridgeError::RateLimited { retry_after_secs } => SyncError::RateLimited {
                wait_secs: retry_after_secs,
            },
            BridgeError::Network { kind, message } => {
                SyncError::Network(format!("{}: {}", kind, message))
            }
            BridgeError::Http { status, message } if status >= 500 => {
                SyncError::Server { status, message }
            }
            BridgeError::Http { status, message } => {
                SyncError::Provider(format!("HTTP {}: {}", status, message))
            }
            BridgeError::DatabaseError(message) => SyncError::Storage(message),
            BridgeError::Io(e) => SyncError::Storage(e.to_string()),
            BridgeError::NotAvailable(message) | BridgeError::OperationFailed(message) => {
                SyncError::Provider(message)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
