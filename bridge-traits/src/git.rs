//! Remote Git Object Store Abstraction
//!
//! The push engine never speaks the git wire protocol. It creates content-addressed
//! objects one REST call at a time and finally moves a branch reference. This module
//! defines that object-level contract so the engine can be driven against any provider
//! exposing a Git Data style API (and against fakes in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File mode for a regular, non-executable blob
pub const MODE_FILE: &str = "100644";
/// File mode for a subdirectory entry
pub const MODE_TREE: &str = "040000";

/// Identity behind the configured credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
}

/// Repository metadata relevant to pushing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub default_branch: Option<String>,
    pub private: bool,
    /// Whether the credentials may push; `None` when the provider did not say
    pub can_push: Option<bool>,
}

/// How blob content is transported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

impl BlobEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobEncoding::Utf8 => "utf-8",
            BlobEncoding::Base64 => "base64",
        }
    }
}

/// Kind of object a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    Blob,
    Tree,
}

/// One entry of a tree object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name within its directory (no slashes)
    pub name: String,
    pub mode: String,
    pub kind: TreeEntryKind,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MODE_FILE.to_string(),
            kind: TreeEntryKind::Blob,
            sha: sha.into(),
        }
    }

    pub fn tree(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: MODE_TREE.to_string(),
            kind: TreeEntryKind::Tree,
            sha: sha.into(),
        }
    }
}

/// Commit to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    /// Empty for an orphan (root) commit
    pub parents: Vec<String>,
}

/// Object-level access to one remote repository
///
/// Implementations are bound to a single repository at construction time and
/// report failures through the classified [`BridgeError`](crate::error::BridgeError)
/// variants (`Unauthorized`, `RepositoryEmpty`, `NotFound`, `RateLimited`, ...).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::git::{GitDataProvider, NewCommit, TreeEntry, BlobEncoding};
///
/// async fn publish(git: &dyn GitDataProvider) -> Result<()> {
///     let blob = git.create_blob(b"hello", BlobEncoding::Utf8).await?;
///     let tree = git.create_tree(&[TreeEntry::blob("hello.txt", blob)]).await?;
///     let commit = git.create_commit(&NewCommit {
///         message: "initial".into(),
///         tree_sha: tree,
///         parents: vec![],
///     }).await?;
///     git.create_ref("main", &commit).await
/// }
/// ```
#[async_trait]
pub trait GitDataProvider: Send + Sync {
    /// Lightweight identity call used to verify credentials
    async fn verify_credentials(&self) -> Result<AuthenticatedUser>;

    /// Fetch repository metadata
    async fn get_repository(&self) -> Result<RepositoryInfo>;

    /// Resolve the commit sha a branch points at
    ///
    /// Returns `Ok(None)` when the branch does not exist and
    /// `Err(BridgeError::RepositoryEmpty)` when the repository has no commits at all.
    async fn get_branch_head(&self, branch: &str) -> Result<Option<String>>;

    /// Create a blob and return its sha
    async fn create_blob(&self, content: &[u8], encoding: BlobEncoding) -> Result<String>;

    /// Create a tree from fully resolved entries and return its sha
    async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String>;

    /// Create a commit and return its sha
    async fn create_commit(&self, commit: &NewCommit) -> Result<String>;

    /// Create `refs/heads/{branch}` pointing at `sha`
    async fn create_ref(&self, branch: &str, sha: &str) -> Result<()>;

    /// Move `refs/heads/{branch}` to `sha`
    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()>;
}
