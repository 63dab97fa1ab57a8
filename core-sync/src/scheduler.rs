//! # Chunk Scheduler
//!
//! "Run the orchestrator again soon", decoupled from the process that ran the
//! current chunk. The orchestrator only ever talks to [`ChunkScheduler`]; the
//! concrete mechanism (in-process timer, cron event, queue message) is chosen
//! by the host.

use crate::Result;
use async_trait::async_trait;
use bridge_traits::background::{BackgroundExecutor, TaskId, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Task id under which chunk invocations are scheduled
pub const CHUNK_TASK_ID: &str = "push_sync_chunk";

#[async_trait]
pub trait ChunkScheduler: Send + Sync {
    /// Arrange for the chunk identified by `token` to run after `delay`.
    ///
    /// Must not double-schedule: if an invocation for `token` is already
    /// pending, this is a no-op.
    async fn schedule_next(&self, token: &str, delay: Duration) -> Result<()>;

    /// Drop a pending invocation, if any
    async fn cancel(&self, token: &str) -> Result<()>;
}

/// [`ChunkScheduler`] on top of a host [`BackgroundExecutor`]
pub struct ExecutorChunkScheduler {
    executor: Arc<dyn BackgroundExecutor>,
}

impl ExecutorChunkScheduler {
    pub fn new(executor: Arc<dyn BackgroundExecutor>) -> Self {
        Self { executor }
    }

    async fn is_pending(&self, task_id: &TaskId) -> Result<bool> {
        let status = self.executor.get_task_status(task_id).await?;
        Ok(status == Some(TaskStatus::Scheduled))
    }
}

#[async_trait]
impl ChunkScheduler for ExecutorChunkScheduler {
    async fn schedule_next(&self, token: &str, delay: Duration) -> Result<()> {
        let task_id = TaskId::new(token);
        if self.is_pending(&task_id).await? {
            debug!(token = token, "Chunk already scheduled");
            return Ok(());
        }

        self.executor.schedule_once(token, delay).await?;
        debug!(token = token, delay_ms = delay.as_millis() as u64, "Scheduled next chunk");
        Ok(())
    }

    async fn cancel(&self, token: &str) -> Result<()> {
        let task_id = TaskId::new(token);
        if self.is_pending(&task_id).await? {
            self.executor.cancel_task(&task_id).await?;
        }
        Ok(())
    }
}
