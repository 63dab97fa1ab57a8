//! Error types for the GitHub provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// GitHub provider errors
#[derive(Error, Debug)]
pub enum GitHubError {
    /// Credentials were rejected under every authorization scheme
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The repository exists but has no commits yet
    #[error("Git repository is empty")]
    RepositoryEmpty,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The governor refused to wait this long inside one call
    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    /// API request returned an unexpected status
    #[error("GitHub API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, GitHubError>;

impl From<GitHubError> for BridgeError {
    fn from(error: GitHubError) -> Self {
        match error {
            GitHubError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            GitHubError::RepositoryEmpty => BridgeError::RepositoryEmpty,
            GitHubError::NotFound(what) => BridgeError::NotFound(what),
            GitHubError::RateLimited {
                retry_after_seconds,
            } => BridgeError::RateLimited {
                retry_after_secs: retry_after_seconds,
            },
            GitHubError::ApiError {
                status_code,
                message,
            } => BridgeError::Http {
                status: status_code,
                message,
            },
            GitHubError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            GitHubError::Bridge(e) => e,
        }
    }
}
