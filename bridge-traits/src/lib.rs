//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the push engine and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per host (desktop daemon, CMS plugin
//! runtime, serverless worker).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with bounded retry
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for staging local content
//! - [`GitDataProvider`](git::GitDataProvider) - Object-level access to a remote repository
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Secret Service)
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value records
//!   (sync state, locks, caches)
//!
//! ### Platform Integration
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Deferred one-shot task scheduling
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Implemented |
//! | CMS host | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations
//! should keep the failure class intact (unauthorized, not found, rate limited,
//! network) so the core can decide between retrying, waiting and failing.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod background;
pub mod error;
pub mod git;
pub mod http;
pub mod storage;
pub mod time;

pub use error::{BridgeError, NetworkErrorKind};

// Re-export commonly used types
pub use background::{BackgroundExecutor, TaskId, TaskStatus};
pub use git::{BlobEncoding, GitDataProvider, NewCommit, TreeEntry, TreeEntryKind};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ResponseClass, RetryPolicy};
pub use storage::{FileSystemAccess, SecureStore, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
