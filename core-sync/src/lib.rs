//! # Push Sync Engine
//!
//! Copies a local directory tree into a remote git repository through a
//! Git Data style REST API, split into short resumable chunks.
//!
//! ## Overview
//!
//! A single push may need thousands of remote calls, more than fit in one
//! host invocation. The engine therefore keeps its progress in a persisted
//! state record and advances it one bounded chunk at a time:
//! - Verifying credentials and inspecting the target repository
//! - Staging configured paths into a scratch directory, one path per chunk
//! - Creating blobs and trees bottom-up, then a commit
//! - Moving the branch ref as the single step that publishes the result
//!
//! ## Components
//!
//! - **State Machine** (`state`): Stages, statuses and the persisted run record
//! - **State Store** (`store`): Atomic load/save/delete of the run record
//! - **Lock** (`lock`): TTL-bounded single-flight lock
//! - **Ignore Matcher** (`ignore`): Glob patterns excluded from staging
//! - **File Collector** (`collector`): Stages one configured path per chunk
//! - **Git Object Builder** (`git`): Blob creation, tree building, branch management
//! - **Chunk Scheduler** (`scheduler`): Requests the next invocation from the host
//! - **Orchestrator** (`orchestrator`): Drives the stages and handles failures

pub mod collector;
pub mod error;
pub mod git;
pub mod ignore;
pub mod lock;
pub mod orchestrator;
pub mod scheduler;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use collector::{CollectOutcome, FileCollector};
pub use error::{Result, SyncError};
pub use git::{BlobCreator, BranchManager, BranchTip, TreeBuildOutcome, TreeBuilder};
pub use ignore::IgnoreMatcher;
pub use lock::SyncLock;
pub use orchestrator::{ChunkOutcome, SyncOrchestrator};
pub use scheduler::{ChunkScheduler, ExecutorChunkScheduler, CHUNK_TASK_ID};
pub use state::{FatalError, SyncReport, SyncStage, SyncState, SyncStatus};
pub use store::{SettingsStateStore, SyncStateStore};
