//! Deferred Execution
//!
//! A push run is split into chunks, each running in a fresh short-lived
//! invocation. The host decides what "run this again later" means.

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Identifier a host uses to route a deferred invocation back to its handler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for its delay to elapse
    Scheduled,
    Running,
    Completed,
    Failed,
}

/// One-shot deferred execution provided by the host
///
/// - **Desktop**: a timer on the async runtime
/// - **CMS / hosted PHP**: a cron-style single event
/// - **Serverless**: a delayed queue message
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::BackgroundExecutor;
/// use std::time::Duration;
///
/// async fn continue_later(executor: &dyn BackgroundExecutor) -> Result<()> {
///     executor.schedule_once("push_sync_chunk", Duration::from_secs(1)).await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Run the handler for `task_id` once, after `delay`
    async fn schedule_once(&self, task_id: &str, delay: Duration) -> Result<TaskId>;

    /// Drop a pending invocation. Unknown ids are not an error.
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// `Ok(None)` when the executor has no record of `task_id`
    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>>;
}
