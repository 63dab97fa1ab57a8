//! Local file access on `tokio::fs`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, trace};

const CACHE_DIR_NAME: &str = "git-push-sync";

/// Staging directories live under the platform cache directory
/// (`~/.cache/git-push-sync` on Linux) unless another base is supplied.
pub struct TokioFileSystem {
    cache_dir: PathBuf,
}

impl TokioFileSystem {
    pub fn new() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            cache_dir: base.join(CACHE_DIR_NAME),
        }
    }

    pub fn with_cache_directory(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_cache_directory(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(BridgeError::Io)?;
        Ok(self.cache_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(BridgeError::Io)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(BridgeError::Io)?;
        Ok(FileMetadata {
            size: metadata.len(),
            is_directory: metadata.is_dir(),
        })
    }

    async fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).await.map_err(BridgeError::Io)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(BridgeError::Io)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(BridgeError::Io)?;
        trace!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(BridgeError::Io)?;
        }

        let copied = fs::copy(from, to).await.map_err(BridgeError::Io)?;
        trace!(from = ?from, to = ?to, size = copied, "Copied file");
        Ok(copied)
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).await.map_err(BridgeError::Io)?;
        debug!(path = ?path, "Removed directory tree");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut read_dir = fs::read_dir(path).await.map_err(BridgeError::Io)?;
        let mut children = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(BridgeError::Io)? {
            children.push(entry.path());
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    fn fixture() -> (tempfile::TempDir, TokioFileSystem) {
        let tmp = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_cache_directory(tmp.path().join("cache"));
        (tmp, fs)
    }

    #[tokio::test]
    async fn test_cache_directory_is_created_on_demand() {
        let (tmp, fs) = fixture();
        let cache_dir = fs.get_cache_directory().await.unwrap();
        assert_eq!(cache_dir, tmp.path().join("cache"));
        assert!(cache_dir.is_dir());
    }

    #[tokio::test]
    async fn test_copy_creates_parents_and_overwrites() {
        let (tmp, fs) = fixture();
        let src = tmp.path().join("style.css");
        let dst = tmp.path().join("staging/themes/site/style.css");
        std_fs::write(&src, "body{}").unwrap();

        assert_eq!(fs.copy_file(&src, &dst).await.unwrap(), 6);

        std_fs::write(&src, "p{}").unwrap();
        assert_eq!(fs.copy_file(&src, &dst).await.unwrap(), 3);
        assert_eq!(fs.read_file(&dst).await.unwrap(), Bytes::from("p{}"));
    }

    #[tokio::test]
    async fn test_canonicalize_list_and_metadata() {
        let (tmp, fs) = fixture();
        std_fs::create_dir_all(tmp.path().join("plugins/seo")).unwrap();
        std_fs::write(tmp.path().join("plugins/seo.php"), "<?php").unwrap();

        let resolved = fs
            .canonicalize(&tmp.path().join("plugins/seo/.."))
            .await
            .unwrap();
        assert!(resolved.ends_with("plugins"));
        assert!(fs.metadata(&resolved).await.unwrap().is_directory);

        let mut listed = fs.list_directory(&resolved).await.unwrap();
        listed.sort();
        assert_eq!(listed, vec![resolved.join("seo"), resolved.join("seo.php")]);

        let file = fs.metadata(&resolved.join("seo.php")).await.unwrap();
        assert_eq!(file.size, 5);
        assert!(!file.is_directory);
    }

    #[tokio::test]
    async fn test_missing_path_keeps_io_kind() {
        let (tmp, fs) = fixture();
        let err = fs.canonicalize(&tmp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
        assert!(!fs.exists(&tmp.path().join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_dir_all() {
        let (tmp, fs) = fixture();
        let staging = tmp.path().join("staging-run");
        std_fs::create_dir_all(staging.join("a/b")).unwrap();
        std_fs::write(staging.join("a/b/c.txt"), "x").unwrap();

        fs.delete_dir_all(&staging).await.unwrap();
        assert!(!staging.exists());
    }
}
