//! Shared test doubles

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::git::{
    AuthenticatedUser, BlobEncoding, GitDataProvider, NewCommit, RepositoryInfo, TreeEntry,
};
use mockall::mock;

mock! {
    pub Git {}

    #[async_trait]
    impl GitDataProvider for Git {
        async fn verify_credentials(&self) -> Result<AuthenticatedUser>;
        async fn get_repository(&self) -> Result<RepositoryInfo>;
        async fn get_branch_head(&self, branch: &str) -> Result<Option<String>>;
        async fn create_blob(&self, content: &[u8], encoding: BlobEncoding) -> Result<String>;
        async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String>;
        async fn create_commit(&self, commit: &NewCommit) -> Result<String>;
        async fn create_ref(&self, branch: &str, sha: &str) -> Result<()>;
        async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()>;
    }
}
