//! Storage and File System Abstractions
//!
//! Three seams: the local tree being pushed ([`FileSystemAccess`]), the
//! durable key-value store every cross-invocation record lives in
//! ([`SettingsStore`]), and credential storage ([`SecureStore`]).

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub is_directory: bool,
}

/// Local file access used to stage and read back the tree being pushed
///
/// `metadata` and `canonicalize` follow symlinks, so callers see what a link
/// points at and can check the resolved path against the sync root.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn stage(fs: &dyn FileSystemAccess, src: &Path, staging: &Path) -> Result<u64> {
///     fs.create_dir_all(staging).await?;
///     fs.copy_file(src, &staging.join("wp-config.php")).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory for scratch data the host may reclaim between runs
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Resolve symlinks and relative components into an absolute path
    async fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Copy a file, creating missing parent directories and overwriting the
    /// destination. Returns the number of bytes copied.
    async fn copy_file(&self, from: &Path, to: &Path) -> Result<u64>;

    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// Full paths of the direct children of `path`, in no particular order
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Credential storage (Keychain, Credential Manager, Secret Service)
///
/// Implementations must never log values.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn save_token(store: &dyn SecureStore, token: &str) -> Result<()> {
///     store.set_secret("github_token", token.as_bytes()).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret, replacing any previous value
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn delete_secret(&self, key: &str) -> Result<()>;
}

/// Durable string key-value store
///
/// Backs every record that must outlive one invocation: sync progress, the
/// single-flight lock, and the short-TTL response and rate-limit cache.
/// Each call is atomic; a reader never observes a partial write.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn claim(store: &dyn SettingsStore, record: &str) -> Result<bool> {
///     store.compare_and_swap("push_sync.lock", None, record).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key` only if it still equals `expected`
    /// (`None` meaning "key absent"). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool>;

    /// Removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}
