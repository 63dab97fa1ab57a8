use std::fmt;

use thiserror::Error;

/// Classes of transport failure an HTTP bridge can report.
///
/// Only some of them are worth retrying; see [`NetworkErrorKind::is_retriable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The peer reset or refused the connection
    ConnectionReset,
    /// The request did not complete within its timeout
    Timeout,
    /// Low-level transport failure while sending or reading the body
    Transport,
    /// Anything else (bad URL, TLS configuration, redirect loops, ...)
    Other,
}

impl NetworkErrorKind {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, NetworkErrorKind::Other)
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Transport => "transport",
            NetworkErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Repository is empty")]
    RepositoryEmpty,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
