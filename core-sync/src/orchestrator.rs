//! # Push Orchestrator
//!
//! Drives the persisted [`SyncState`] through its stages, one chunk per
//! invocation.
//!
//! ## Workflow
//!
//! 1. `start()` takes the single-flight lock, writes a fresh state and schedules
//!    the first chunk
//! 2. Every `run_chunk()` loads the state, refreshes the lock, runs the work of
//!    the current stage and saves the result
//! 3. Non-terminal chunks schedule their successor and return immediately
//! 4. Collection handles one configured path per chunk; the upload (blobs,
//!    trees, commit, ref) runs as a single chunk
//! 5. Success deletes the state and keeps a final report; failure keeps the
//!    failed state for polling. Both release the lock and remove staging.
//!
//! ## Crash containment
//!
//! A chunk runs under `catch_unwind`. A panic is written to the state as a
//! fatal-error marker (see [`SyncOrchestrator::record_fatal_error`]), and the
//! next invocation cleans up and reports failure instead of resuming.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(&config, git, store, scheduler)?;
//! let report = orchestrator.start().await?;
//!
//! // Called by the host scheduler, once per chunk
//! match orchestrator.run_chunk().await? {
//!     ChunkOutcome::Completed(report) => println!("{:?}", report.commit_sha),
//!     other => println!("{:?}", other.report()),
//! }
//! ```

use crate::collector::FileCollector;
use crate::git::{BranchManager, BranchTip, TreeBuilder};
use crate::ignore::IgnoreMatcher;
use crate::lock::SyncLock;
use crate::scheduler::{ChunkScheduler, CHUNK_TASK_ID};
use crate::state::{FatalError, SyncReport, SyncStage, SyncState};
use crate::store::SyncStateStore;
use crate::{Result, SyncError};
use bridge_traits::error::BridgeError;
use bridge_traits::git::{GitDataProvider, NewCommit};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::{CoreConfig, SyncPath};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const STAGING_DIR_NAME: &str = "push-sync";

/// Result of one `run_chunk()` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Nothing to do: no sync in progress, or another run owns the lock
    Idle,
    /// Progress saved and the next chunk scheduled
    Continued { report: SyncReport, delay: Duration },
    /// The remote asked for a pause; the same stage runs again after `delay`
    Deferred { report: SyncReport, delay: Duration },
    Completed(SyncReport),
    Failed(SyncReport),
}

impl ChunkOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            ChunkOutcome::Idle => None,
            ChunkOutcome::Continued { report, .. }
            | ChunkOutcome::Deferred { report, .. }
            | ChunkOutcome::Completed(report)
            | ChunkOutcome::Failed(report) => Some(report),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ChunkOutcome::Completed(_) | ChunkOutcome::Failed(_))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct SyncOrchestrator {
    git: Arc<dyn GitDataProvider>,
    store: Arc<dyn SyncStateStore>,
    scheduler: Arc<dyn ChunkScheduler>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    lock: SyncLock,
    collector: FileCollector,
    tree_builder: TreeBuilder,
    branch_manager: BranchManager,
    branch: String,
    paths_to_sync: Vec<SyncPath>,
    staging_root: Option<PathBuf>,
    commit_message: String,
    chunk_delay: Duration,
    lock_ttl: Duration,
}

impl SyncOrchestrator {
    /// Build an orchestrator for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if an ignore pattern does not compile.
    pub fn new(
        config: &CoreConfig,
        git: Arc<dyn GitDataProvider>,
        store: Arc<dyn SyncStateStore>,
        scheduler: Arc<dyn ChunkScheduler>,
    ) -> Result<Self> {
        let ignore = Arc::new(IgnoreMatcher::new(&config.ignore_patterns)?);

        Ok(Self {
            lock: SyncLock::new(
                config.settings_store.clone(),
                config.clock.clone(),
                config.lock_ttl,
            ),
            collector: FileCollector::new(
                config.file_system.clone(),
                config.sync_root.clone(),
                ignore,
            ),
            tree_builder: TreeBuilder::new(config.file_system.clone(), git.clone()),
            branch_manager: BranchManager::new(git.clone()),
            git,
            store,
            scheduler,
            fs: config.file_system.clone(),
            clock: config.clock.clone(),
            branch: config.repository.branch.clone(),
            paths_to_sync: config.paths_to_sync.clone(),
            staging_root: config.staging_root.clone(),
            commit_message: config.commit_message.clone(),
            chunk_delay: config.chunk_delay,
            lock_ttl: config.lock_ttl,
        })
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Begin a new push run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] without touching any state when
    /// another run holds the lock.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<SyncReport> {
        let run_id = Uuid::new_v4().to_string();
        if !self.lock.acquire(&run_id).await? {
            warn!("Sync start refused: another run holds the lock");
            return Err(SyncError::AlreadyRunning);
        }

        match self.begin_run(&run_id).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(release_error) = self.lock.release(&run_id).await {
                    warn!(error = %release_error, "Failed to release lock after start error");
                }
                Err(e)
            }
        }
    }

    /// Execute the current stage once and hand off to the scheduler.
    #[instrument(skip(self))]
    pub async fn run_chunk(&self) -> Result<ChunkOutcome> {
        let Some(mut state) = self.store.load().await? else {
            debug!("No sync in progress");
            return Ok(ChunkOutcome::Idle);
        };

        match state.stage {
            SyncStage::Complete => {
                return Ok(ChunkOutcome::Completed(SyncReport::from(&state)));
            }
            SyncStage::Failed => return Ok(ChunkOutcome::Failed(SyncReport::from(&state))),
            _ => {}
        }

        if let Some(fatal) = state.fatal_error.clone() {
            return self.abort_after_fatal(state, fatal).await;
        }

        if !self.lock.refresh(&state.run_id).await? {
            warn!(run_id = %state.run_id, "Lock held by another run, skipping chunk");
            return Ok(ChunkOutcome::Idle);
        }

        let stage = state.stage;
        state.begin_chunk();
        debug!(run_id = %state.run_id, stage = %stage, "Running chunk");

        let result = AssertUnwindSafe(self.execute_stage(&mut state))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => self.after_success(state).await,
            Ok(Err(e)) if e.is_terminal() => self.fail_run(state, e).await,
            Ok(Err(e)) => {
                let delay = e.retry_after().unwrap_or(self.chunk_delay);
                warn!(
                    stage = %stage,
                    error = %e,
                    delay_secs = delay.as_secs(),
                    "Rescheduling chunk"
                );
                self.defer(state, delay).await
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(stage = %stage, message = %message, "Chunk panicked");
                self.record_fatal_error(&message).await?;
                self.scheduler
                    .schedule_next(CHUNK_TASK_ID, self.chunk_delay)
                    .await?;
                Err(SyncError::FatalProcess {
                    stage: stage.to_string(),
                    message,
                })
            }
        }
    }

    /// Crash hook: mark the persisted run as fatally failed.
    ///
    /// The next `run_chunk()` sees the marker, cleans up and reports failure.
    /// Returns `false` when there is no live run to mark.
    pub async fn record_fatal_error(&self, message: &str) -> Result<bool> {
        let Some(mut state) = self.store.load().await? else {
            return Ok(false);
        };
        if state.stage.is_terminal() {
            return Ok(false);
        }

        state.fatal_error = Some(FatalError {
            message: message.to_string(),
            stage: state.stage,
            at: self.clock.now(),
        });
        self.store.save(&state).await?;
        error!(run_id = %state.run_id, stage = %state.stage, "Recorded fatal error");
        Ok(true)
    }

    /// Stop the current run without contacting the remote.
    ///
    /// Returns `false` when there was nothing to cancel.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> Result<bool> {
        self.scheduler.cancel(CHUNK_TASK_ID).await?;

        let state = self.store.load().await?;
        if let Some(mut state) = state.clone() {
            self.remove_staging(&state).await;
            state.staging_dir = None;
            if !state.stage.is_terminal() {
                state.fail("Sync cancelled", self.clock.now());
            }
            self.store.save_report(&SyncReport::from(&state)).await?;
            info!(run_id = %state.run_id, "Sync cancelled");
        }

        self.store.delete().await?;
        self.lock.force_release().await?;
        Ok(state.is_some())
    }

    /// Progress of the current run, or the final report of the last one.
    pub async fn status(&self) -> Result<Option<SyncReport>> {
        if let Some(state) = self.store.load().await? {
            return Ok(Some(SyncReport::from(&state)));
        }
        self.store.load_report().await
    }

    // ========================================================================
    // Run lifecycle
    // ========================================================================

    async fn begin_run(&self, run_id: &str) -> Result<SyncReport> {
        let now = self.clock.now();

        if let Some(mut previous) = self.store.load().await? {
            warn!(
                previous_run = %previous.run_id,
                stage = %previous.stage,
                fatal = previous.fatal_error.is_some(),
                stale = previous.is_stale(now, self.lock_ttl),
                "Replacing state left by an earlier run"
            );
            self.remove_staging(&previous).await;
            previous.staging_dir = None;
            if !previous.stage.is_terminal() {
                previous.fail("Abandoned: the run stopped before finishing", now);
            }
            self.store.save_report(&SyncReport::from(&previous)).await?;
        }

        let state = SyncState::new(
            run_id,
            self.branch.as_str(),
            self.paths_to_sync.clone(),
            now,
        );
        self.store.save(&state).await?;
        self.scheduler
            .schedule_next(CHUNK_TASK_ID, Duration::ZERO)
            .await?;

        info!(
            run_id = run_id,
            branch = %self.branch,
            paths = state.paths_to_sync.len(),
            "Sync started"
        );
        Ok(SyncReport::from(&state))
    }

    async fn after_success(&self, mut state: SyncState) -> Result<ChunkOutcome> {
        if state.stage == SyncStage::Complete {
            let report = SyncReport::from(&state);
            self.store.save_report(&report).await?;
            self.store.delete().await?;
            self.remove_staging(&state).await;
            self.lock.release(&state.run_id).await?;
            info!(
                run_id = %state.run_id,
                commit = ?state.commit_sha,
                files = state.files_uploaded,
                bytes = state.bytes_uploaded,
                "Sync complete"
            );
            return Ok(ChunkOutcome::Completed(report));
        }

        state.suspend();
        self.store.save(&state).await?;
        self.scheduler
            .schedule_next(CHUNK_TASK_ID, self.chunk_delay)
            .await?;
        Ok(ChunkOutcome::Continued {
            report: SyncReport::from(&state),
            delay: self.chunk_delay,
        })
    }

    async fn defer(&self, mut state: SyncState, delay: Duration) -> Result<ChunkOutcome> {
        state.suspend();
        state.message = format!("Rate limited, resuming in {}s", delay.as_secs());
        self.store.save(&state).await?;
        self.scheduler.schedule_next(CHUNK_TASK_ID, delay).await?;
        Ok(ChunkOutcome::Deferred {
            report: SyncReport::from(&state),
            delay,
        })
    }

    async fn fail_run(&self, mut state: SyncState, err: SyncError) -> Result<ChunkOutcome> {
        error!(
            run_id = %state.run_id,
            stage = %state.stage,
            error = %err,
            "Sync failed"
        );

        self.remove_staging(&state).await;
        state.staging_dir = None;
        state.fail(err.to_string(), self.clock.now());
        self.store.save(&state).await?;
        self.lock.release(&state.run_id).await?;
        Ok(ChunkOutcome::Failed(SyncReport::from(&state)))
    }

    async fn abort_after_fatal(
        &self,
        mut state: SyncState,
        fatal: FatalError,
    ) -> Result<ChunkOutcome> {
        error!(
            run_id = %state.run_id,
            stage = %fatal.stage,
            message = %fatal.message,
            "Aborting run after fatal error"
        );

        self.remove_staging(&state).await;
        state.staging_dir = None;
        state.fail(
            SyncError::FatalProcess {
                stage: fatal.stage.to_string(),
                message: fatal.message,
            }
            .to_string(),
            self.clock.now(),
        );
        self.store.save(&state).await?;
        self.lock.release(&state.run_id).await?;
        Ok(ChunkOutcome::Failed(SyncReport::from(&state)))
    }

    async fn remove_staging(&self, state: &SyncState) {
        let Some(dir) = &state.staging_dir else {
            return;
        };
        match self.fs.exists(dir).await {
            Ok(true) => {
                if let Err(e) = self.fs.delete_dir_all(dir).await {
                    warn!(path = %dir.display(), error = %e, "Failed to remove staging directory");
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to inspect staging directory");
            }
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn execute_stage(&self, state: &mut SyncState) -> Result<()> {
        match state.stage {
            SyncStage::Authentication => self.authenticate(state).await,
            SyncStage::RepositoryCheck => self.check_repository(state).await,
            SyncStage::PrepareStaging => self.prepare_staging(state).await,
            SyncStage::CollectingFiles => self.collect_files(state).await,
            SyncStage::UploadingFiles => self.upload_files(state).await,
            SyncStage::Complete | SyncStage::Failed => Ok(()),
        }
    }

    async fn authenticate(&self, state: &mut SyncState) -> Result<()> {
        let user = self.git.verify_credentials().await?;
        info!(login = %user.login, "Credentials verified");

        state.message = format!("Authenticated as {}", user.login);
        state.advance_to(SyncStage::RepositoryCheck, self.clock.now())
    }

    async fn check_repository(&self, state: &mut SyncState) -> Result<()> {
        let repository_empty = match self.git.get_repository().await {
            Ok(repository) => {
                if repository.can_push == Some(false) {
                    return Err(SyncError::Auth(format!(
                        "Credentials cannot push to {}",
                        repository.full_name
                    )));
                }
                match self.git.get_branch_head(&state.branch).await {
                    Ok(_) => false,
                    Err(BridgeError::RepositoryEmpty) => true,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(BridgeError::RepositoryEmpty) => true,
            Err(e) => return Err(e.into()),
        };

        if repository_empty {
            info!("Repository is empty, the first commit will be an orphan");
        }
        state.repository_empty = repository_empty;
        state.message = "Repository verified".to_string();
        state.advance_to(SyncStage::PrepareStaging, self.clock.now())
    }

    async fn prepare_staging(&self, state: &mut SyncState) -> Result<()> {
        let base = match &self.staging_root {
            Some(root) => root.clone(),
            None => self.fs.get_cache_directory().await?.join(STAGING_DIR_NAME),
        };
        let dir = base.join(format!("staging-{}", state.run_id));

        if self.fs.exists(&dir).await? {
            self.fs.delete_dir_all(&dir).await?;
        }
        self.fs.create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "Prepared staging directory");

        state.staging_dir = Some(dir);
        state.message = "Staging directory ready".to_string();
        state.advance_to(SyncStage::CollectingFiles, self.clock.now())
    }

    async fn collect_files(&self, state: &mut SyncState) -> Result<()> {
        if let Some(outcome) = self.collector.collect_next(state).await? {
            state.message = format!(
                "Collected {} ({} of {})",
                outcome.path,
                state.current_path_index,
                state.paths_to_sync.len()
            );
        }

        if state.paths_exhausted() {
            state.advance_to(SyncStage::UploadingFiles, self.clock.now())?;
        }
        Ok(())
    }

    /// Known limit: the whole upload runs in this one chunk, so a very large
    /// staged tree can outlast the host's execution window.
    async fn upload_files(&self, state: &mut SyncState) -> Result<()> {
        let staging_dir = state
            .staging_dir
            .clone()
            .ok_or_else(|| SyncError::Validation("Staging directory missing".to_string()))?;

        let tip = self.branch_manager.resolve_tip(&state.branch).await?;
        let tree = self.tree_builder.build(&staging_dir).await?;

        let commit_sha = self
            .git
            .create_commit(&NewCommit {
                message: self.commit_message.clone(),
                tree_sha: tree.root_sha.clone(),
                parents: tip.parents(),
            })
            .await?;
        info!(
            commit = %commit_sha,
            tree = %tree.root_sha,
            orphan = tip == BranchTip::Orphan,
            "Created commit"
        );

        self.branch_manager
            .update_ref(&state.branch, &tip, &commit_sha)
            .await?;

        state.files_uploaded = tree.files;
        state.bytes_uploaded = tree.bytes;
        state.message = format!("Pushed {} files to {}", tree.files, state.branch);
        state.commit_sha = Some(commit_sha);
        state.advance_to(SyncStage::Complete, self.clock.now())
    }
}
