//! # Core Configuration Module
//!
//! Immutable configuration for the push engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the push target, the ordered list of paths to publish, tuning knobs
//! for rate limiting and locking, and every platform bridge the engine talks
//! through. Validation is fail-fast: a config that builds is a config the
//! orchestrator can run with.
//!
//! Runtime bookkeeping (sync progress, rate-limit numbers, the lock, ETags)
//! never lives here. It goes through the `SettingsStore` bridge.
//!
//! ## Required Settings
//!
//! - Repository owner and name
//! - A token source (inline token or a `SecureStore` key)
//! - The sync root and at least one path to sync
//!
//! ## Bridges (with platform defaults)
//!
//! - `HttpClient` - desktop default: reqwest
//! - `FileSystemAccess` - desktop default: tokio fs
//! - `SettingsStore` - desktop default: SQLite at `database_path`
//! - `SecureStore` - desktop default: OS keyring (only when the token lives there)
//! - `BackgroundExecutor` - optional, used by the chunk scheduler
//! - `Clock` - defaults to the system clock
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .repository("acme", "site-content")
//!     .branch("main")
//!     .token("ghp_example")
//!     .sync_root("/srv/site")
//!     .sync_path("plugins", true)
//!     .sync_path("themes", true)
//!     .ignore_pattern("*.log")
//!     .database_path("/var/lib/push-sync/state.db")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! Missing settings produce [`Error::Config`]; missing bridges without a
//! platform default produce [`Error::CapabilityMissing`] with a hint on how
//! to inject one.

use crate::error::{Error, Result};
use bridge_traits::{
    background::BackgroundExecutor,
    http::{HttpClient, RetryPolicy},
    storage::{FileSystemAccess, SecureStore, SettingsStore},
    time::{Clock, SystemClock},
};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Sync content from local directory";
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u64 = 10;
pub const DEFAULT_MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of the ordered path list.
///
/// `path` is relative to the sync root. Entries with `included = false` keep
/// their slot (and cursor position) but are skipped during collection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncPath {
    pub path: String,
    pub included: bool,
}

impl SyncPath {
    pub fn new(path: impl Into<String>, included: bool) -> Self {
        Self {
            path: path.into(),
            included,
        }
    }
}

/// Where the access token comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Token supplied directly by the host.
    Inline(String),
    /// Token read from the `SecureStore` under this key on every session.
    SecureStore { key: String },
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Inline(_) => f.write_str("Inline([REDACTED])"),
            TokenSource::SecureStore { key } => {
                f.debug_struct("SecureStore").field("key", key).finish()
            }
        }
    }
}

/// Remote repository the engine pushes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub api_base_url: String,
}

impl RepositoryTarget {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Main configuration for the push engine.
#[derive(Clone)]
pub struct CoreConfig {
    pub repository: RepositoryTarget,
    pub token_source: TokenSource,

    /// Local directory every `SyncPath` is resolved against.
    pub sync_root: PathBuf,
    pub paths_to_sync: Vec<SyncPath>,
    /// Glob patterns (`*`, `?`, `**`) matched against relative paths and file names.
    pub ignore_patterns: Vec<String>,
    /// Parent directory for staging trees. Defaults to the file system cache dir.
    pub staging_root: Option<PathBuf>,
    pub commit_message: String,

    pub rate_limit_threshold: u64,
    /// Longest wait the governor sleeps through inside a chunk.
    pub max_rate_limit_wait: Duration,
    pub lock_ttl: Duration,
    /// Delay between consecutive chunks.
    pub chunk_delay: Duration,
    pub http_timeout: Duration,
    pub retry_policy: RetryPolicy,

    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub secure_store: Option<Arc<dyn SecureStore>>,
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("repository", &self.repository)
            .field("token_source", &self.token_source)
            .field("sync_root", &self.sync_root)
            .field("paths_to_sync", &self.paths_to_sync)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("staging_root", &self.staging_root)
            .field("rate_limit_threshold", &self.rate_limit_threshold)
            .field("max_rate_limit_wait", &self.max_rate_limit_wait)
            .field("lock_ttl", &self.lock_ttl)
            .field("chunk_delay", &self.chunk_delay)
            .field("http_timeout", &self.http_timeout)
            .field("has_secure_store", &self.secure_store.is_some())
            .field(
                "has_background_executor",
                &self.background_executor.is_some(),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Repository owner, name and branch are non-empty and well formed
    /// - The API base URL is http(s)
    /// - Every sync path is relative, stays inside the root, and is unique
    /// - Ignore patterns are non-empty
    /// - Tuning values are in range
    /// - A `SecureStore` is present when the token lives there
    pub fn validate(&self) -> Result<()> {
        let repo = &self.repository;
        validate_name("Repository owner", &repo.owner)?;
        validate_name("Repository name", &repo.name)?;
        validate_branch(&repo.branch)?;

        if !(repo.api_base_url.starts_with("https://") || repo.api_base_url.starts_with("http://"))
        {
            return Err(Error::Config(format!(
                "API base URL must be http(s): {}",
                repo.api_base_url
            )));
        }

        match &self.token_source {
            TokenSource::Inline(token) if token.trim().is_empty() => {
                return Err(Error::Config("Access token cannot be empty".to_string()));
            }
            TokenSource::SecureStore { key } => {
                if key.is_empty() {
                    return Err(Error::Config(
                        "SecureStore token key cannot be empty".to_string(),
                    ));
                }
                if self.secure_store.is_none() {
                    return Err(secure_store_missing_error());
                }
            }
            _ => {}
        }

        if self.sync_root.as_os_str().is_empty() {
            return Err(Error::Config("Sync root cannot be empty".to_string()));
        }

        if self.paths_to_sync.is_empty() {
            return Err(Error::Config(
                "At least one path to sync is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.paths_to_sync {
            validate_sync_path(&entry.path)?;
            let normalized = entry.path.trim_end_matches('/');
            if !seen.insert(normalized.to_string()) {
                return Err(Error::Config(format!(
                    "Duplicate path to sync: {}",
                    entry.path
                )));
            }
        }

        if let Some(pattern) = self.ignore_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Ignore pattern cannot be empty: {:?}",
                pattern
            )));
        }

        if self.commit_message.trim().is_empty() {
            return Err(Error::Config("Commit message cannot be empty".to_string()));
        }

        if self.rate_limit_threshold == 0 {
            return Err(Error::Config(
                "Rate limit threshold must be greater than 0".to_string(),
            ));
        }

        if self.max_rate_limit_wait > Duration::from_secs(3600) {
            return Err(Error::Config(
                "Max rate limit wait exceeds maximum of 1 hour".to_string(),
            ));
        }

        if self.lock_ttl < Duration::from_secs(60) {
            return Err(Error::Config(
                "Lock TTL must be at least 60 seconds".to_string(),
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(Error::Config(
                "HTTP timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy must allow at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Resolves the access token from its configured source.
    ///
    /// Secure-store tokens are read on every call so a rotated credential is
    /// picked up by the next chunk without rebuilding the config.
    pub async fn resolve_token(&self) -> Result<String> {
        match &self.token_source {
            TokenSource::Inline(token) => Ok(token.clone()),
            TokenSource::SecureStore { key } => {
                let store = self
                    .secure_store
                    .as_ref()
                    .ok_or_else(secure_store_missing_error)?;
                let raw = store
                    .get_secret(key)
                    .await?
                    .ok_or_else(|| Error::TokenUnavailable(key.clone()))?;
                let token = String::from_utf8(raw)
                    .map_err(|_| Error::Config(format!("Secret {} is not valid UTF-8", key)))?;
                let token = token.trim().to_string();
                if token.is_empty() {
                    return Err(Error::TokenUnavailable(key.clone()));
                }
                Ok(token)
            }
        }
    }
}

fn validate_name(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", label)));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::Config(format!(
            "{} contains invalid characters: {}",
            label, value
        )));
    }
    Ok(())
}

fn validate_branch(branch: &str) -> Result<()> {
    if branch.is_empty() {
        return Err(Error::Config("Branch cannot be empty".to_string()));
    }
    if branch.starts_with('/')
        || branch.ends_with('/')
        || branch.contains("..")
        || branch.contains(char::is_whitespace)
    {
        return Err(Error::Config(format!("Invalid branch name: {}", branch)));
    }
    Ok(())
}

fn validate_sync_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::Config("Path to sync cannot be empty".to_string()));
    }

    let as_path = Path::new(path);
    if as_path.is_absolute() || path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::Config(format!(
            "Path to sync must be relative to the sync root: {}",
            path
        )));
    }

    if as_path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(Error::Config(format!(
            "Path to sync must stay inside the sync root: {}",
            path
        )));
    }

    Ok(())
}

fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "The access token is configured to be read from a SecureStore. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
                 Otherwise inject a SecureStore implementation or pass the token inline."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default implementation.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "remote API calls"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "staging files"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(database_path: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = database_path.map(Path::to_path_buf).ok_or_else(|| {
        Error::Config(
            "Database path is required when no SettingsStore is injected. \
             Use .database_path() to set it."
                .to_string(),
        )
    })?;

    let init_store = |path: PathBuf| -> Result<SqliteSettingsStore> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default SettingsStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so hop to a plain thread there
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_database_path: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
    Err(capability_missing(
        "SettingsStore",
        "persisting sync state, the lock and the rate-limit cache",
    ))
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) once every required setting is
/// present; the builder fills in defaults and validates the result.
#[derive(Default)]
pub struct CoreConfigBuilder {
    owner: Option<String>,
    name: Option<String>,
    branch: Option<String>,
    api_base_url: Option<String>,
    token_source: Option<TokenSource>,
    sync_root: Option<PathBuf>,
    paths_to_sync: Vec<SyncPath>,
    ignore_patterns: Vec<String>,
    staging_root: Option<PathBuf>,
    commit_message: Option<String>,
    database_path: Option<PathBuf>,
    rate_limit_threshold: Option<u64>,
    max_rate_limit_wait: Option<Duration>,
    lock_ttl: Option<Duration>,
    chunk_delay: Option<Duration>,
    http_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the target repository.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().repository("acme", "site-content");
    /// ```
    pub fn repository(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.name = Some(name.into());
        self
    }

    /// Sets the target branch.
    ///
    /// Default: `main`
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Overrides the API base URL (GitHub Enterprise, test servers).
    ///
    /// Default: `https://api.github.com`
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Uses an inline access token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token_source = Some(TokenSource::Inline(token.into()));
        self
    }

    /// Reads the access token from the `SecureStore` under `key`.
    pub fn token_secret_key(mut self, key: impl Into<String>) -> Self {
        self.token_source = Some(TokenSource::SecureStore { key: key.into() });
        self
    }

    /// Sets the local directory that sync paths are resolved against.
    pub fn sync_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.sync_root = Some(path.into());
        self
    }

    /// Appends one path to the ordered sync list.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .sync_path("plugins", true)
    ///     .sync_path("uploads", false);
    /// ```
    pub fn sync_path(mut self, path: impl Into<String>, included: bool) -> Self {
        self.paths_to_sync.push(SyncPath::new(path, included));
        self
    }

    /// Replaces the ordered sync list.
    pub fn paths_to_sync(mut self, paths: Vec<SyncPath>) -> Self {
        self.paths_to_sync = paths;
        self
    }

    pub fn ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    pub fn ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn staging_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staging_root = Some(path.into());
        self
    }

    pub fn commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    /// Sets the SQLite file backing the default desktop `SettingsStore`.
    ///
    /// Ignored when a `SettingsStore` is injected.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Default: 10
    pub fn rate_limit_threshold(mut self, threshold: u64) -> Self {
        self.rate_limit_threshold = Some(threshold);
        self
    }

    /// Default: 60 seconds
    pub fn max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = Some(wait);
        self
    }

    /// Default: 15 minutes
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = Some(ttl);
        self
    }

    /// Default: 1 second
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Default: 30 seconds
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the settings store implementation.
    ///
    /// The settings store backs sync state, the single-flight lock and the
    /// rate-limit/ETag cache. Its writes must be atomic per key.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    /// Injects a clock; tests use this to control TTLs and rate-limit windows.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - Required settings are missing
    /// - Required bridges are missing and have no platform default
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let owner = self.owner.ok_or_else(|| {
            Error::Config("Repository is required. Use .repository() to set it.".to_string())
        })?;
        let name = self.name.ok_or_else(|| {
            Error::Config("Repository is required. Use .repository() to set it.".to_string())
        })?;

        let token_source = self.token_source.ok_or_else(|| {
            Error::Config(
                "Access token is required. Use .token() or .token_secret_key() to set it."
                    .to_string(),
            )
        })?;

        let sync_root = self.sync_root.ok_or_else(|| {
            Error::Config("Sync root is required. Use .sync_root() to set it.".to_string())
        })?;

        let http_timeout = self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(http_timeout)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.database_path.as_deref())?,
        };

        let secure_store = match (self.secure_store, &token_source) {
            (Some(store), _) => Some(store),
            (None, TokenSource::SecureStore { .. }) => Some(provide_default_secure_store()?),
            (None, TokenSource::Inline(_)) => None,
        };

        let config = CoreConfig {
            repository: RepositoryTarget {
                owner,
                name,
                branch: self.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                api_base_url: self
                    .api_base_url
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            },
            token_source,
            sync_root,
            paths_to_sync: self.paths_to_sync,
            ignore_patterns: self.ignore_patterns,
            staging_root: self.staging_root,
            commit_message: self
                .commit_message
                .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
            rate_limit_threshold: self
                .rate_limit_threshold
                .unwrap_or(DEFAULT_RATE_LIMIT_THRESHOLD),
            max_rate_limit_wait: self
                .max_rate_limit_wait
                .unwrap_or(DEFAULT_MAX_RATE_LIMIT_WAIT),
            lock_ttl: self.lock_ttl.unwrap_or(DEFAULT_LOCK_TTL),
            chunk_delay: self.chunk_delay.unwrap_or(DEFAULT_CHUNK_DELAY),
            http_timeout,
            retry_policy: self.retry_policy.unwrap_or_default(),
            http_client,
            file_system,
            settings_store,
            secure_store,
            background_executor: self.background_executor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;

    struct MockHttpClient;

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            unimplemented!()
        }
    }

    struct MockFileSystem;

    #[async_trait]
    impl FileSystemAccess for MockFileSystem {
        async fn get_cache_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/cache"))
        }
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            unimplemented!()
        }
        async fn canonicalize(&self, path: &Path) -> BridgeResult<PathBuf> {
            Ok(path.to_path_buf())
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }
        async fn copy_file(&self, _from: &Path, _to: &Path) -> BridgeResult<u64> {
            Ok(0)
        }
        async fn delete_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    struct MockSettingsStore;

    #[async_trait]
    impl SettingsStore for MockSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<&str>,
            _value: &str,
        ) -> BridgeResult<bool> {
            Ok(true)
        }
        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockSecureStore;

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(Some(b"ghp_from_store".to_vec()))
        }
        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_example")
            .sync_root("/srv/site")
            .sync_path("plugins", true)
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .settings_store(Arc::new(MockSettingsStore))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.repository.full_name(), "acme/site");
        assert_eq!(config.repository.branch, "main");
        assert_eq!(config.repository.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.rate_limit_threshold, 10);
        assert_eq!(config.max_rate_limit_wait, Duration::from_secs(60));
        assert_eq!(config.lock_ttl, Duration::from_secs(900));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.commit_message, DEFAULT_COMMIT_MESSAGE);
        assert!(config.secure_store.is_none());
    }

    #[test]
    fn test_builder_requires_repository() {
        let result = CoreConfig::builder()
            .token("ghp_example")
            .sync_root("/srv/site")
            .sync_path("plugins", true)
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Repository is required"));
    }

    #[test]
    fn test_builder_requires_token() {
        let result = CoreConfig::builder()
            .repository("acme", "site")
            .sync_root("/srv/site")
            .sync_path("plugins", true)
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Access token is required"));
    }

    #[test]
    fn test_builder_requires_sync_root() {
        let result = CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_example")
            .build();

        assert!(result.unwrap_err().to_string().contains("Sync root"));
    }

    #[test]
    fn test_builder_requires_paths() {
        let result = CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_example")
            .sync_root("/srv/site")
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .settings_store(Arc::new(MockSettingsStore))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one path"));
    }

    #[test]
    fn test_rejects_duplicate_paths() {
        let result = base_builder().sync_path("plugins/", false).build();
        assert!(result.unwrap_err().to_string().contains("Duplicate path"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let absolute = base_builder().sync_path("/etc", true).build();
        assert!(absolute.unwrap_err().to_string().contains("relative"));

        let parent = base_builder().sync_path("themes/../../etc", true).build();
        assert!(parent.unwrap_err().to_string().contains("inside the sync root"));
    }

    #[test]
    fn test_rejects_invalid_branch_and_names() {
        assert!(base_builder().branch("feature/../x").build().is_err());
        assert!(base_builder().branch("").build().is_err());
        assert!(base_builder().repository("acme corp", "site").build().is_err());
    }

    #[test]
    fn test_rejects_empty_ignore_pattern() {
        let result = base_builder().ignore_patterns(["*.log", " "]).build();
        assert!(result.unwrap_err().to_string().contains("Ignore pattern"));
    }

    #[test]
    fn test_rejects_short_lock_ttl() {
        let result = base_builder().lock_ttl(Duration::from_secs(5)).build();
        assert!(result.unwrap_err().to_string().contains("Lock TTL"));
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let result = base_builder().rate_limit_threshold(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_api_base_url_trailing_slash_trimmed() {
        let config = base_builder()
            .api_base_url("https://ghe.example.com/api/v3/")
            .build()
            .unwrap();
        assert_eq!(
            config.repository.api_base_url,
            "https://ghe.example.com/api/v3"
        );

        assert!(base_builder().api_base_url("ftp://nope").build().is_err());
    }

    #[test]
    fn test_secret_key_with_injected_store() {
        let config = base_builder()
            .token_secret_key("github.token")
            .secure_store(Arc::new(MockSecureStore))
            .build()
            .unwrap();

        assert_eq!(
            config.token_source,
            TokenSource::SecureStore {
                key: "github.token".to_string()
            }
        );
        assert!(config.secure_store.is_some());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_secret_key_without_store_is_capability_error() {
        let result = base_builder().token_secret_key("github.token").build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "SecureStore")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_settings_store_without_shims() {
        let result = CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_example")
            .sync_root("/srv/site")
            .sync_path("plugins", true)
            .http_client(Arc::new(MockHttpClient))
            .file_system(Arc::new(MockFileSystem))
            .build();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("SettingsStore"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_example")
            .sync_root(tmp.path())
            .sync_path("plugins", true)
            .database_path(tmp.path().join("state.db"))
            .build()
            .expect("desktop defaults should succeed");

        let settings = config.settings_store.clone();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            settings.set_string("probe", "ok").await.unwrap();
            assert_eq!(
                settings.get_string("probe").await.unwrap().as_deref(),
                Some("ok")
            );
        });
    }

    #[tokio::test]
    async fn test_resolve_token_sources() {
        let inline = base_builder().build().unwrap();
        assert_eq!(inline.resolve_token().await.unwrap(), "ghp_example");

        let stored = base_builder()
            .token_secret_key("github.token")
            .secure_store(Arc::new(MockSecureStore))
            .build()
            .unwrap();
        assert_eq!(stored.resolve_token().await.unwrap(), "ghp_from_store");
    }

    #[test]
    fn test_debug_hides_token() {
        let config = base_builder().build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ghp_example"));
        assert!(rendered.contains("acme"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = base_builder().ignore_pattern("*.log").build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.paths_to_sync, config.paths_to_sync);
        assert_eq!(cloned.ignore_patterns, vec!["*.log".to_string()]);
    }
}
