//! Branch tip resolution and the final ref update

use crate::Result;
use bridge_traits::error::BridgeError;
use bridge_traits::git::GitDataProvider;
use std::sync::Arc;
use tracing::{info, instrument};

/// Where the new commit attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTip {
    /// The branch exists and points at this commit
    Existing(String),
    /// No branch (or no commits at all): the new commit is a root commit
    Orphan,
}

impl BranchTip {
    /// Parents for the new commit
    pub fn parents(&self) -> Vec<String> {
        match self {
            BranchTip::Existing(sha) => vec![sha.clone()],
            BranchTip::Orphan => Vec::new(),
        }
    }
}

pub struct BranchManager {
    git: Arc<dyn GitDataProvider>,
}

impl BranchManager {
    pub fn new(git: Arc<dyn GitDataProvider>) -> Self {
        Self { git }
    }

    /// Look the branch up on the remote.
    ///
    /// Always asks, even when the repository was empty at verification time:
    /// a resumed upload may find the ref an earlier attempt already created.
    #[instrument(skip(self))]
    pub async fn resolve_tip(&self, branch: &str) -> Result<BranchTip> {
        match self.git.get_branch_head(branch).await {
            Ok(Some(sha)) => Ok(BranchTip::Existing(sha)),
            Ok(None) | Err(BridgeError::RepositoryEmpty) => {
                info!(branch = branch, "Branch does not exist yet, creating orphan commit");
                Ok(BranchTip::Orphan)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point `branch` at `commit_sha`.
    ///
    /// An existing branch is fast-forwarded from its old tip; an orphan gets a
    /// fresh ref.
    #[instrument(skip(self))]
    pub async fn update_ref(
        &self,
        branch: &str,
        tip: &BranchTip,
        commit_sha: &str,
    ) -> Result<()> {
        match tip {
            BranchTip::Existing(previous) => {
                self.git.update_ref(branch, commit_sha, false).await?;
                info!(branch = branch, from = %previous, to = commit_sha, "Branch updated");
            }
            BranchTip::Orphan => {
                self.git.create_ref(branch, commit_sha).await?;
                info!(branch = branch, to = commit_sha, "Branch created");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGit;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_empty_repository_is_orphan() {
        let mut git = MockGit::new();
        git.expect_get_branch_head()
            .times(1)
            .returning(|_| Err(BridgeError::RepositoryEmpty));

        let manager = BranchManager::new(Arc::new(git));
        let tip = manager.resolve_tip("main").await.unwrap();
        assert_eq!(tip, BranchTip::Orphan);
        assert!(tip.parents().is_empty());
    }

    #[tokio::test]
    async fn test_ref_created_by_earlier_attempt_is_fast_forwarded() {
        let mut git = MockGit::new();
        git.expect_get_branch_head()
            .returning(|_| Ok(Some("root".to_string())));
        git.expect_create_ref().never();
        git.expect_update_ref()
            .with(eq("main"), eq("second"), eq(false))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let manager = BranchManager::new(Arc::new(git));
        let tip = manager.resolve_tip("main").await.unwrap();
        assert_eq!(tip, BranchTip::Existing("root".to_string()));
        manager.update_ref("main", &tip, "second").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_branch_or_empty_response_is_orphan() {
        let mut git = MockGit::new();
        git.expect_get_branch_head()
            .with(eq("feature"))
            .returning(|_| Ok(None));
        git.expect_get_branch_head()
            .with(eq("main"))
            .returning(|_| Err(BridgeError::RepositoryEmpty));

        let manager = BranchManager::new(Arc::new(git));
        assert_eq!(
            manager.resolve_tip("feature").await.unwrap(),
            BranchTip::Orphan
        );
        assert_eq!(
            manager.resolve_tip("main").await.unwrap(),
            BranchTip::Orphan
        );
    }

    #[tokio::test]
    async fn test_existing_branch_is_fast_forwarded() {
        let mut git = MockGit::new();
        git.expect_get_branch_head()
            .returning(|_| Ok(Some("old".to_string())));
        git.expect_update_ref()
            .with(eq("main"), eq("new"), eq(false))
            .times(1)
            .returning(|_, _, _| Ok(()));
        git.expect_create_ref().never();

        let manager = BranchManager::new(Arc::new(git));
        let tip = manager.resolve_tip("main").await.unwrap();
        assert_eq!(tip.parents(), vec!["old".to_string()]);
        manager.update_ref("main", &tip, "new").await.unwrap();
    }

    #[tokio::test]
    async fn test_orphan_creates_ref() {
        let mut git = MockGit::new();
        git.expect_create_ref()
            .with(eq("main"), eq("root"))
            .times(1)
            .returning(|_, _| Ok(()));
        git.expect_update_ref().never();

        let manager = BranchManager::new(Arc::new(git));
        manager
            .update_ref("main", &BranchTip::Orphan, "root")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let mut git = MockGit::new();
        git.expect_get_branch_head()
            .returning(|_| Err(BridgeError::Unauthorized("revoked".to_string())));

        let manager = BranchManager::new(Arc::new(git));
        let err = manager.resolve_tip("main").await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Auth(_)));
    }
}
