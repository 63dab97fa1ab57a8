//! Bottom-up tree construction
//!
//! A parent tree entry needs the sha of its child tree, so directories are
//! discovered first with an explicit stack, then processed deepest level
//! first. Directories that end up with no entries produce no tree and are
//! left out of their parent.

use super::blob::BlobCreator;
use crate::{Result, SyncError};
use bridge_traits::git::{GitDataProvider, TreeEntry};
use bridge_traits::storage::FileSystemAccess;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Root tree plus aggregate counters for progress reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeBuildOutcome {
    pub root_sha: String,
    pub files: u64,
    pub bytes: u64,
    pub binary_files: u64,
    pub trees: u64,
}

struct DirNode {
    path: PathBuf,
    depth: usize,
    files: Vec<(String, PathBuf)>,
    subdirs: Vec<(String, PathBuf)>,
}

pub struct TreeBuilder {
    fs: Arc<dyn FileSystemAccess>,
    git: Arc<dyn GitDataProvider>,
    blobs: BlobCreator,
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::Validation(format!("Unsupported file name: {}", path.display()))
        })
}

impl TreeBuilder {
    pub fn new(fs: Arc<dyn FileSystemAccess>, git: Arc<dyn GitDataProvider>) -> Self {
        Self {
            fs,
            blobs: BlobCreator::new(git.clone()),
            git,
        }
    }

    async fn discover(&self, staging_dir: &Path) -> Result<Vec<DirNode>> {
        let mut nodes = Vec::new();
        let mut pending = vec![(staging_dir.to_path_buf(), 0usize)];

        while let Some((dir, depth)) = pending.pop() {
            let mut node = DirNode {
                path: dir.clone(),
                depth,
                files: Vec::new(),
                subdirs: Vec::new(),
            };

            let mut children = self.fs.list_directory(&dir).await?;
            children.sort();
            for child in children {
                let name = entry_name(&child)?;
                if self.fs.metadata(&child).await?.is_directory {
                    pending.push((child.clone(), depth + 1));
                    node.subdirs.push((name, child));
                } else {
                    node.files.push((name, child));
                }
            }
            nodes.push(node);
        }

        Ok(nodes)
    }

    /// Upload every staged file and directory and return the root tree.
    #[instrument(skip(self))]
    pub async fn build(&self, staging_dir: &Path) -> Result<TreeBuildOutcome> {
        let mut nodes = self.discover(staging_dir).await?;
        nodes.sort_by(|a, b| b.depth.cmp(&a.depth));

        let mut outcome = TreeBuildOutcome::default();
        let mut tree_shas: HashMap<PathBuf, String> = HashMap::new();

        for node in nodes {
            let mut entries = Vec::with_capacity(node.files.len() + node.subdirs.len());

            for (name, path) in &node.files {
                let content = self.fs.read_file(path).await?;
                let blob = self.blobs.create(&content).await?;
                outcome.files += 1;
                outcome.bytes += blob.size;
                if blob.is_binary {
                    outcome.binary_files += 1;
                }
                entries.push(TreeEntry::blob(name.clone(), blob.sha));
            }

            for (name, path) in &node.subdirs {
                if let Some(sha) = tree_shas.remove(path) {
                    entries.push(TreeEntry::tree(name.clone(), sha));
                }
            }

            if entries.is_empty() {
                debug!(path = %node.path.display(), "Skipping empty directory");
                continue;
            }

            entries.sort_by(|a, b| a.name.cmp(&b.name));
            let sha = self.git.create_tree(&entries).await?;
            debug!(
                path = %node.path.display(),
                sha = %sha,
                entries = entries.len(),
                "Created tree"
            );
            outcome.trees += 1;
            tree_shas.insert(node.path, sha);
        }

        outcome.root_sha = tree_shas.remove(staging_dir).ok_or_else(|| {
            SyncError::Validation("Nothing to upload: no files were staged".to_string())
        })?;

        info!(
            root = %outcome.root_sha,
            files = outcome.files,
            bytes = outcome.bytes,
            trees = outcome.trees,
            "Built tree"
        );
        Ok(outcome)
    }
}
