//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the push engine crates:
//! - Immutable configuration (`CoreConfig` builder with fail-fast validation)
//! - Logging and tracing infrastructure with credential redaction
//!
//! ## Overview
//!
//! Everything here is read-only once built. Mutable runtime bookkeeping
//! (sync progress, locks, rate-limit numbers) lives behind the
//! `SettingsStore` bridge and is owned by `core-sync` and `provider-github`.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, RepositoryTarget, SyncPath, TokenSource};
pub use error::{Error, Result};
