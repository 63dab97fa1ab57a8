//! GitHub API request and response types
//!
//! Data structures for the Git Data, repository and rate-limit endpoints.

use bridge_traits::git::{BlobEncoding, TreeEntry, TreeEntryKind};
use serde::{Deserialize, Serialize};

/// `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub login: String,
}

/// `GET /repos/{owner}/{repo}`
///
/// See: https://docs.github.com/en/rest/repos/repos#get-a-repository
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryResponse {
    pub full_name: String,

    #[serde(default)]
    pub default_branch: Option<String>,

    #[serde(default)]
    pub private: bool,

    #[serde(default)]
    pub permissions: Option<RepositoryPermissions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPermissions {
    #[serde(default)]
    pub push: bool,
}

/// `GET /repos/{owner}/{repo}/git/ref/heads/{branch}`
#[derive(Debug, Clone, Deserialize)]
pub struct RefResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    pub object: RefObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefObject {
    pub sha: String,
}

/// Any creation endpoint that answers with the new object's sha
#[derive(Debug, Clone, Deserialize)]
pub struct ShaResponse {
    pub sha: String,
}

/// `POST /repos/{owner}/{repo}/git/blobs`
#[derive(Debug, Serialize)]
pub struct CreateBlobRequest<'a> {
    pub content: &'a str,
    pub encoding: BlobEncoding,
}

/// `POST /repos/{owner}/{repo}/git/trees`
///
/// No `base_tree`: every push writes a complete snapshot.
#[derive(Debug, Serialize)]
pub struct CreateTreeRequest<'a> {
    pub tree: Vec<TreeItem<'a>>,
}

#[derive(Debug, Serialize)]
pub struct TreeItem<'a> {
    pub path: &'a str,
    pub mode: &'a str,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: &'a str,
}

impl<'a> From<&'a TreeEntry> for TreeItem<'a> {
    fn from(entry: &'a TreeEntry) -> Self {
        Self {
            path: &entry.name,
            mode: &entry.mode,
            kind: entry.kind,
            sha: &entry.sha,
        }
    }
}

/// `POST /repos/{owner}/{repo}/git/commits`
#[derive(Debug, Serialize)]
pub struct CreateCommitRequest<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: &'a [String],
}

/// `POST /repos/{owner}/{repo}/git/refs`
#[derive(Debug, Serialize)]
pub struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: &'a str,
}

/// `PATCH /repos/{owner}/{repo}/git/refs/heads/{branch}`
#[derive(Debug, Serialize)]
pub struct UpdateRefRequest<'a> {
    pub sha: &'a str,
    pub force: bool,
}

/// `GET /rate_limit`
///
/// Only the top-level `rate` block (core quota) is read.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResponse {
    pub rate: RateLimitQuota,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitQuota {
    pub limit: u64,
    pub remaining: u64,
    /// Unix epoch seconds
    pub reset: i64,
}

/// Error payload GitHub attaches to non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
