//! # Desktop Bridges
//!
//! Bridge implementations for a long-running desktop or server process
//! (macOS, Windows, Linux):
//!
//! | Bridge | Backed by |
//! |--------|-----------|
//! | `HttpClient` | `reqwest` with rustls, one attempt per call |
//! | `FileSystemAccess` | `tokio::fs` |
//! | `SettingsStore` | one SQLite table through `sqlx` |
//! | `SecureStore` | the OS keychain via `keyring` (`secure-store` feature, on by default) |
//! | `BackgroundExecutor` | Tokio timers |
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioFileSystem};
//!
//! let settings = SqliteSettingsStore::new("push-sync.db".into()).await?;
//! let config = CoreConfig::builder()
//!     .http_client(Arc::new(ReqwestHttpClient::new()?))
//!     .settings_store(Arc::new(settings))
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     // repository, token, sync paths ...
//!     .build()?;
//! ```

mod background;
mod filesystem;
mod http;
mod settings;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use background::TokioBackgroundExecutor;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
