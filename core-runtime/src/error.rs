use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Failures while building or resolving a [`CoreConfig`](crate::CoreConfig)
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing setting; the message names the field
    #[error("Configuration error: {0}")]
    Config(String),

    /// No bridge was injected and this platform has no default for it
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("No access token stored under {0}")]
    TokenUnavailable(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A platform default exists but could not be constructed
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
