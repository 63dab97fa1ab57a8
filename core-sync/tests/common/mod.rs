//! Shared fixtures for push-sync integration tests
//!
//! `FakeGit` is an in-memory, content-addressed object store. Identical
//! content always yields the same sha, so two runs over the same files can be
//! compared by root tree alone.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::git::{
    AuthenticatedUser, BlobEncoding, GitDataProvider, NewCommit, RepositoryInfo, TreeEntry,
    TreeEntryKind,
};
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::ManualClock;
use core_runtime::CoreConfig;
use core_sync::{
    ChunkOutcome, ChunkScheduler, SettingsStateStore, SyncOrchestrator, SyncState,
    SyncStateStore,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fake remote
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    VerifyCredentials,
    GetRepository,
    GetBranchHead,
    CreateBlob,
    CreateTree,
    CreateCommit,
    CreateRef,
    UpdateRef,
}

#[derive(Default)]
struct Remote {
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, Vec<TreeEntry>>,
    commits: HashMap<String, NewCommit>,
    refs: HashMap<String, String>,
    calls: Vec<Call>,
    reject_credentials: bool,
    missing: bool,
    rate_limit_blobs: Option<u64>,
    panic_on_tree: bool,
}

#[derive(Default)]
pub struct FakeGit {
    remote: Mutex<Remote>,
}

fn content_sha(kind: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_credentials(&self) {
        self.remote.lock().unwrap().reject_credentials = true;
    }

    pub fn remove_repository(&self) {
        self.remote.lock().unwrap().missing = true;
    }

    /// The next blob upload fails with a rate limit asking for `wait_secs`
    pub fn rate_limit_next_blob(&self, wait_secs: u64) {
        self.remote.lock().unwrap().rate_limit_blobs = Some(wait_secs);
    }

    pub fn panic_on_tree(&self, enabled: bool) {
        self.remote.lock().unwrap().panic_on_tree = enabled;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.remote.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.remote.lock().unwrap().calls.clear();
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.remote.lock().unwrap().refs.get(branch).cloned()
    }

    pub fn commit(&self, sha: &str) -> Option<NewCommit> {
        self.remote.lock().unwrap().commits.get(sha).cloned()
    }

    /// Root tree of the commit `branch` points at
    pub fn head_tree(&self, branch: &str) -> Option<String> {
        let head = self.head(branch)?;
        self.commit(&head).map(|commit| commit.tree_sha)
    }

    pub fn blob_count(&self) -> usize {
        self.remote.lock().unwrap().blobs.len()
    }

    /// Every file reachable from `tree_sha`, keyed by slash-separated path
    pub fn files(&self, tree_sha: &str) -> BTreeMap<String, Vec<u8>> {
        let remote = self.remote.lock().unwrap();
        let mut files = BTreeMap::new();
        let mut pending = vec![(String::new(), tree_sha.to_string())];

        while let Some((prefix, sha)) = pending.pop() {
            for entry in remote.trees.get(&sha).cloned().unwrap_or_default() {
                let path = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", prefix, entry.name)
                };
                match entry.kind {
                    TreeEntryKind::Tree => pending.push((path, entry.sha)),
                    TreeEntryKind::Blob => {
                        let content = remote.blobs.get(&entry.sha).cloned().unwrap_or_default();
                        files.insert(path, content);
                    }
                }
            }
        }
        files
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, Remote> {
        let mut remote = self.remote.lock().unwrap();
        remote.calls.push(call);
        remote
    }
}

#[async_trait]
impl GitDataProvider for FakeGit {
    async fn verify_credentials(&self) -> BridgeResult<AuthenticatedUser> {
        let remote = self.record(Call::VerifyCredentials);
        if remote.reject_credentials {
            return Err(BridgeError::Unauthorized("Bad credentials".to_string()));
        }
        Ok(AuthenticatedUser {
            login: "octocat".to_string(),
        })
    }

    async fn get_repository(&self) -> BridgeResult<RepositoryInfo> {
        let remote = self.record(Call::GetRepository);
        if remote.missing {
            return Err(BridgeError::NotFound("acme/site".to_string()));
        }
        Ok(RepositoryInfo {
            full_name: "acme/site".to_string(),
            default_branch: Some("main".to_string()),
            private: true,
            can_push: Some(true),
        })
    }

    async fn get_branch_head(&self, branch: &str) -> BridgeResult<Option<String>> {
        let remote = self.record(Call::GetBranchHead);
        if remote.refs.is_empty() {
            return Err(BridgeError::RepositoryEmpty);
        }
        Ok(remote.refs.get(branch).cloned())
    }

    async fn create_blob(&self, content: &[u8], encoding: BlobEncoding) -> BridgeResult<String> {
        let mut remote = self.record(Call::CreateBlob);
        if let Some(wait) = remote.rate_limit_blobs.take() {
            return Err(BridgeError::RateLimited {
                retry_after_secs: wait,
            });
        }

        if encoding == BlobEncoding::Utf8 && std::str::from_utf8(content).is_err() {
            return Err(BridgeError::Http {
                status: 422,
                message: "content is not valid utf-8".to_string(),
            });
        }
        let bytes = content.to_vec();
        let sha = content_sha("blob", &bytes);
        remote.blobs.insert(sha.clone(), bytes);
        Ok(sha)
    }

    async fn create_tree(&self, entries: &[TreeEntry]) -> BridgeResult<String> {
        let mut remote = self.record(Call::CreateTree);
        if remote.panic_on_tree {
            drop(remote);
            panic!("simulated crash while building trees");
        }

        let serialized = serde_json::to_vec(entries).map_err(|e| BridgeError::Http {
            status: 422,
            message: e.to_string(),
        })?;
        let sha = content_sha("tree", &serialized);
        remote.trees.insert(sha.clone(), entries.to_vec());
        Ok(sha)
    }

    async fn create_commit(&self, commit: &NewCommit) -> BridgeResult<String> {
        let mut remote = self.record(Call::CreateCommit);
        let serialized = serde_json::to_vec(commit).map_err(|e| BridgeError::Http {
            status: 422,
            message: e.to_string(),
        })?;
        let sha = content_sha("commit", &serialized);
        remote.commits.insert(sha.clone(), commit.clone());
        Ok(sha)
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> BridgeResult<()> {
        let mut remote = self.record(Call::CreateRef);
        if remote.refs.contains_key(branch) {
            return Err(BridgeError::Http {
                status: 422,
                message: "Reference already exists".to_string(),
            });
        }
        remote.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> BridgeResult<()> {
        let mut remote = self.record(Call::UpdateRef);
        let Some(current) = remote.refs.get(branch).cloned() else {
            return Err(BridgeError::Http {
                status: 422,
                message: "Reference does not exist".to_string(),
            });
        };
        let parents = remote
            .commits
            .get(sha)
            .map(|commit| commit.parents.clone())
            .unwrap_or_default();
        if !force && !parents.contains(&current) {
            return Err(BridgeError::Http {
                status: 422,
                message: "Update is not a fast forward".to_string(),
            });
        }
        remote.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<Duration>>,
    cancelled: Mutex<usize>,
}

impl RecordingScheduler {
    pub fn scheduled(&self) -> Vec<Duration> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> usize {
        *self.cancelled.lock().unwrap()
    }
}

#[async_trait]
impl ChunkScheduler for RecordingScheduler {
    async fn schedule_next(&self, _token: &str, delay: Duration) -> core_sync::Result<()> {
        self.scheduled.lock().unwrap().push(delay);
        Ok(())
    }

    async fn cancel(&self, _token: &str) -> core_sync::Result<()> {
        *self.cancelled.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One local site, one remote and one settings database
pub struct Harness {
    pub root: TempDir,
    pub staging: TempDir,
    pub git: Arc<FakeGit>,
    pub settings: Arc<dyn SettingsStore>,
    pub store: Arc<SettingsStateStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
    pub config: CoreConfig,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub async fn new(paths: &[(&str, bool)], ignore: &[&str]) -> Self {
        Self::with_git(Arc::new(FakeGit::new()), paths, ignore).await
    }

    pub async fn with_git(git: Arc<FakeGit>, paths: &[(&str, bool)], ignore: &[&str]) -> Self {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let settings: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        // 2024-06-01T12:00:00Z
        let clock = Arc::new(ManualClock::at_millis(1_717_243_200_000));

        let mut builder = CoreConfig::builder()
            .repository("acme", "site")
            .token("ghp_test")
            .sync_root(root.path())
            .staging_root(staging.path())
            .commit_message("Sync site content")
            .ignore_patterns(ignore.iter().copied())
            .chunk_delay(Duration::from_millis(500))
            .settings_store(settings.clone())
            .file_system(Arc::new(TokioFileSystem::new()))
            .clock(clock.clone());
        for (path, included) in paths {
            builder = builder.sync_path(*path, *included);
        }
        let config = builder.build().unwrap();

        let store = Arc::new(SettingsStateStore::new(settings.clone()));
        let scheduler = Arc::new(RecordingScheduler::default());
        let orchestrator =
            SyncOrchestrator::new(&config, git.clone(), store.clone(), scheduler.clone()).unwrap();

        Self {
            root,
            staging,
            git,
            settings,
            store,
            scheduler,
            clock,
            config,
            orchestrator,
        }
    }

    /// A second orchestrator over the same database and remote, as a fresh
    /// process would build it
    pub fn another_process(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            &self.config,
            self.git.clone(),
            self.store.clone(),
            self.scheduler.clone(),
        )
        .unwrap()
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub async fn state(&self) -> Option<SyncState> {
        self.store.load().await.unwrap()
    }

    pub fn staging_dirs(&self) -> Vec<PathBuf> {
        list_dirs(self.staging.path())
    }

    /// Run chunks until the run finishes or goes idle
    pub async fn run_to_end(&self, orchestrator: &SyncOrchestrator) -> ChunkOutcome {
        for _ in 0..100 {
            let outcome = orchestrator.run_chunk().await.unwrap();
            if outcome.is_finished() || outcome == ChunkOutcome::Idle {
                return outcome;
            }
        }
        panic!("run did not finish within 100 chunks");
    }
}

fn list_dirs(path: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default()
}
