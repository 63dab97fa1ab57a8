//! # File Collector
//!
//! Stages configured local paths into the scratch directory, one top-level
//! path per chunk.
//!
//! Each call resolves the entry under the state's cursor, checks it stays
//! inside the sync root, copies it into the same relative location under the
//! staging directory and moves the cursor by one. Directories are walked with
//! an explicit stack. Copies overwrite, so re-running an entry after a crash
//! leaves the same staged tree.

use crate::ignore::IgnoreMatcher;
use crate::state::SyncState;
use crate::{Result, SyncError};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::FileSystemAccess;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// What one collection chunk did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    pub path: String,
    /// The entry was excluded in configuration or matched an ignore pattern
    pub skipped: bool,
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub entries_ignored: u64,
}

pub struct FileCollector {
    fs: Arc<dyn FileSystemAccess>,
    sync_root: PathBuf,
    ignore: Arc<IgnoreMatcher>,
}

impl FileCollector {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        sync_root: impl Into<PathBuf>,
        ignore: Arc<IgnoreMatcher>,
    ) -> Self {
        Self {
            fs,
            sync_root: sync_root.into(),
            ignore,
        }
    }

    /// Collect the entry under the cursor and advance the cursor.
    ///
    /// Returns `None` once every entry has been processed.
    #[instrument(
        skip(self, state),
        fields(run_id = %state.run_id, index = state.current_path_index)
    )]
    pub async fn collect_next(&self, state: &mut SyncState) -> Result<Option<CollectOutcome>> {
        let Some(entry) = state.current_path().cloned() else {
            return Ok(None);
        };
        let staging_dir = state
            .staging_dir
            .clone()
            .ok_or_else(|| SyncError::Validation("Staging directory not prepared".to_string()))?;

        let relative = PathBuf::from(entry.path.trim_end_matches('/'));
        let mut outcome = CollectOutcome {
            path: entry.path.clone(),
            ..Default::default()
        };

        if !entry.included {
            debug!(path = %entry.path, "Path excluded in configuration");
            outcome.skipped = true;
        } else if let Some(pattern) = self.ignore.matching_pattern(&relative) {
            debug!(path = %entry.path, pattern, "Path matches ignore pattern");
            outcome.skipped = true;
        } else {
            let source = self.resolve_source(&relative).await?;
            self.copy_tree(&source, &relative, &staging_dir, &mut outcome)
                .await?;
        }

        state.advance_cursor();
        info!(
            path = %outcome.path,
            files = outcome.files_copied,
            bytes = outcome.bytes_copied,
            ignored = outcome.entries_ignored,
            skipped = outcome.skipped,
            "Collected path"
        );
        Ok(Some(outcome))
    }

    /// Resolve `relative` against the root, rejecting anything outside it.
    async fn resolve_source(&self, relative: &Path) -> Result<PathBuf> {
        let root = self.fs.canonicalize(&self.sync_root).await.map_err(|e| {
            SyncError::Validation(format!(
                "Sync root {} is not accessible: {}",
                self.sync_root.display(),
                e
            ))
        })?;

        let candidate = root.join(relative);
        let source = match self.fs.canonicalize(&candidate).await {
            Ok(path) => path,
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::Validation(format!(
                    "Path to sync does not exist: {}",
                    relative.display()
                )));
            }
            Err(e) => {
                return Err(SyncError::Validation(format!(
                    "Path to sync is not accessible: {}: {}",
                    relative.display(),
                    e
                )));
            }
        };

        if !source.starts_with(&root) {
            return Err(SyncError::Validation(format!(
                "Path to sync resolves outside the sync root: {}",
                relative.display()
            )));
        }
        Ok(source)
    }

    async fn copy_tree(
        &self,
        source: &Path,
        relative: &Path,
        staging_dir: &Path,
        outcome: &mut CollectOutcome,
    ) -> Result<()> {
        let metadata = self.fs.metadata(source).await?;
        if !metadata.is_directory {
            outcome.bytes_copied += self
                .fs
                .copy_file(source, &staging_dir.join(relative))
                .await?;
            outcome.files_copied += 1;
            return Ok(());
        }

        let mut pending = vec![(source.to_path_buf(), relative.to_path_buf())];
        while let Some((dir, dir_relative)) = pending.pop() {
            self.fs.create_dir_all(&staging_dir.join(&dir_relative)).await?;

            let mut children = self.fs.list_directory(&dir).await?;
            children.sort();

            for child in children {
                let Some(name) = child.file_name() else {
                    continue;
                };
                let child_relative = dir_relative.join(name);
                if self.ignore.is_ignored(&child_relative) {
                    debug!(path = %child_relative.display(), "Ignored");
                    outcome.entries_ignored += 1;
                    continue;
                }

                if self.fs.metadata(&child).await?.is_directory {
                    pending.push((child, child_relative));
                } else {
                    outcome.bytes_copied += self
                        .fs
                        .copy_file(&child, &staging_dir.join(&child_relative))
                        .await?;
                    outcome.files_copied += 1;
                }
            }
        }
        Ok(())
    }
}
