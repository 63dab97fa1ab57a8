//! # Push Sync State Machine
//!
//! The single persisted record that drives a multi-chunk push.
//!
//! ## Overview
//!
//! A push is split into many short invocations. Everything one invocation
//! needs to pick up where the previous one stopped lives in [`SyncState`],
//! which is saved after every chunk and reloaded at the start of the next.
//!
//! ## State Machine
//!
//! ```text
//! Authentication → RepositoryCheck → PrepareStaging
//!                                          ↓
//!                   Complete ← UploadingFiles ← CollectingFiles
//!
//! any non-terminal stage ──→ Failed
//! ```
//!
//! Stages only move one step forward or drop to `Failed`. Terminal stages
//! never change again.

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_runtime::config::SyncPath;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Stage and Status
// ============================================================================

/// Phase of a push run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    /// Verify the configured credentials
    Authentication,
    /// Confirm the repository exists and detect whether it is empty
    RepositoryCheck,
    /// Create the scratch directory files are staged into
    PrepareStaging,
    /// Copy one configured path per chunk into staging
    CollectingFiles,
    /// Create blobs, trees and the commit, then move the branch
    UploadingFiles,
    Complete,
    Failed,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Authentication => "authentication",
            SyncStage::RepositoryCheck => "repository_check",
            SyncStage::PrepareStaging => "prepare_staging",
            SyncStage::CollectingFiles => "collecting_files",
            SyncStage::UploadingFiles => "uploading_files",
            SyncStage::Complete => "complete",
            SyncStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStage::Complete | SyncStage::Failed)
    }

    /// The stage a successful chunk leads to, if any
    pub fn next(&self) -> Option<SyncStage> {
        match self {
            SyncStage::Authentication => Some(SyncStage::RepositoryCheck),
            SyncStage::RepositoryCheck => Some(SyncStage::PrepareStaging),
            SyncStage::PrepareStaging => Some(SyncStage::CollectingFiles),
            SyncStage::CollectingFiles => Some(SyncStage::UploadingFiles),
            SyncStage::UploadingFiles => Some(SyncStage::Complete),
            SyncStage::Complete | SyncStage::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: SyncStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == SyncStage::Failed || self.next() == Some(to)
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse run status, as shown to whoever polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created by `start()`, first chunk not run yet
    Initializing,
    /// Waiting for the next scheduled chunk
    Pending,
    /// A chunk is executing
    Running,
    Complete,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Initializing => "initializing",
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Complete => "complete",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sync State
// ============================================================================

/// Marker left by the crash hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub message: String,
    pub stage: SyncStage,
    pub at: DateTime<Utc>,
}

/// Persisted progress of one push run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Identifies the run; also the owner recorded in the lock
    pub run_id: String,
    pub stage: SyncStage,
    pub status: SyncStatus,
    pub branch: String,
    pub staging_dir: Option<PathBuf>,
    /// Ordered source paths; excluded entries keep their slot
    pub paths_to_sync: Vec<SyncPath>,
    /// Next entry of `paths_to_sync` to collect
    pub current_path_index: usize,
    /// Set by the repository check when the remote has no commits yet
    pub repository_empty: bool,
    pub fatal_error: Option<FatalError>,
    /// When the current stage was entered
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Stage that was executing when the run failed
    pub failed_stage: Option<SyncStage>,
    pub files_uploaded: u64,
    pub bytes_uploaded: u64,
    pub commit_sha: Option<String>,
}

impl SyncState {
    pub fn new(
        run_id: impl Into<String>,
        branch: impl Into<String>,
        paths_to_sync: Vec<SyncPath>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: SyncStage::Authentication,
            status: SyncStatus::Initializing,
            branch: branch.into(),
            staging_dir: None,
            paths_to_sync,
            current_path_index: 0,
            repository_empty: false,
            fatal_error: None,
            timestamp: now,
            message: "Sync queued".to_string(),
            failed_stage: None,
            files_uploaded: 0,
            bytes_uploaded: 0,
            commit_sha: None,
        }
    }

    /// Move to `to`, which must be the next stage or `Failed`.
    pub fn advance_to(&mut self, to: SyncStage, now: DateTime<Utc>) -> Result<()> {
        if !self.stage.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }

        self.stage = to;
        self.timestamp = now;
        match to {
            SyncStage::Complete => self.status = SyncStatus::Complete,
            SyncStage::Failed => self.status = SyncStatus::Failed,
            _ => {}
        }
        Ok(())
    }

    /// Terminate the run with a user-facing message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        if self.stage != SyncStage::Failed {
            self.failed_stage = Some(self.stage);
        }
        self.stage = SyncStage::Failed;
        self.status = SyncStatus::Failed;
        self.message = message.into();
        self.timestamp = now;
    }

    pub fn begin_chunk(&mut self) {
        self.status = SyncStatus::Running;
    }

    pub fn suspend(&mut self) {
        if !self.stage.is_terminal() {
            self.status = SyncStatus::Pending;
        }
    }

    pub fn current_path(&self) -> Option<&SyncPath> {
        self.paths_to_sync.get(self.current_path_index)
    }

    pub fn paths_exhausted(&self) -> bool {
        self.current_path_index >= self.paths_to_sync.len()
    }

    pub fn advance_cursor(&mut self) {
        if !self.paths_exhausted() {
            self.current_path_index += 1;
        }
    }

    /// True when the current stage was entered more than `ttl` ago
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

// ============================================================================
// Report
// ============================================================================

/// What a poller sees: stage, status and progress, never internals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub stage: SyncStage,
    pub status: SyncStatus,
    pub message: String,
    pub current_path_index: usize,
    pub total_paths: usize,
    pub files_uploaded: u64,
    pub bytes_uploaded: u64,
    pub commit_sha: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SyncState> for SyncReport {
    fn from(state: &SyncState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            stage: state.stage,
            status: state.status,
            message: state.message.clone(),
            current_path_index: state.current_path_index,
            total_paths: state.paths_to_sync.len(),
            files_uploaded: state.files_uploaded,
            bytes_uploaded: state.bytes_uploaded,
            commit_sha: state.commit_sha.clone(),
            updated_at: state.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SyncState {
        SyncState::new(
            "run-1",
            "main",
            vec![SyncPath::new("themes", true), SyncPath::new("plugins", true)],
            Utc::now(),
        )
    }

    #[test]
    fn test_stage_walks_forward_one_step_at_a_time() {
        let mut state = state();
        let now = Utc::now();

        assert!(state.advance_to(SyncStage::PrepareStaging, now).is_err());
        assert_eq!(state.stage, SyncStage::Authentication);

        for stage in [
            SyncStage::RepositoryCheck,
            SyncStage::PrepareStaging,
            SyncStage::CollectingFiles,
            SyncStage::UploadingFiles,
            SyncStage::Complete,
        ] {
            state.advance_to(stage, now).unwrap();
        }
        assert_eq!(state.status, SyncStatus::Complete);

        let err = state.advance_to(SyncStage::Failed, now).unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_cannot_go_backwards() {
        let mut state = state();
        let now = Utc::now();
        state.advance_to(SyncStage::RepositoryCheck, now).unwrap();
        assert!(state.advance_to(SyncStage::Authentication, now).is_err());
    }

    #[test]
    fn test_fail_remembers_stage() {
        let mut state = state();
        let now = Utc::now();
        state.advance_to(SyncStage::RepositoryCheck, now).unwrap();
        state.fail("Repository not found", now);

        assert_eq!(state.stage, SyncStage::Failed);
        assert_eq!(state.status, SyncStatus::Failed);
        assert_eq!(state.failed_stage, Some(SyncStage::RepositoryCheck));

        state.fail("second message", now);
        assert_eq!(state.failed_stage, Some(SyncStage::RepositoryCheck));
        assert_eq!(state.message, "second message");
    }

    #[test]
    fn test_cursor_stops_at_end() {
        let mut state = state();
        assert_eq!(state.current_path().unwrap().path, "themes");
        state.advance_cursor();
        state.advance_cursor();
        state.advance_cursor();
        assert_eq!(state.current_path_index, 2);
        assert!(state.paths_exhausted());
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_value(state()).unwrap();
        assert_eq!(json["stage"], "authentication");
        assert_eq!(json["status"], "initializing");

        let parsed: SyncState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state_with_time(parsed.timestamp));
    }

    fn state_with_time(timestamp: DateTime<Utc>) -> SyncState {
        let mut s = state();
        s.timestamp = timestamp;
        s
    }

    #[test]
    fn test_staleness() {
        let start = Utc::now();
        let state = SyncState::new("run", "main", vec![], start);
        let later = start + chrono::Duration::minutes(20);
        assert!(state.is_stale(later, Duration::from_secs(15 * 60)));
        assert!(!state.is_stale(start, Duration::from_secs(15 * 60)));
    }
}
