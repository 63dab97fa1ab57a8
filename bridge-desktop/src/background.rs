//! In-process deferred execution on Tokio timers

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, TaskId, TaskStatus},
    error::{BridgeError, Result},
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type TaskHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
type Slots = Arc<Mutex<HashMap<TaskId, Slot>>>;

struct Slot {
    status: TaskStatus,
    /// Bumped on every schedule so a finishing run never clobbers a newer one
    generation: u64,
    timer: JoinHandle<()>,
}

/// [`BackgroundExecutor`] for desktop hosts
///
/// Handlers are registered per task id up front. `schedule_once` arms a Tokio
/// timer that invokes the handler when it fires. A handler may schedule its
/// own id again while still running; that is how one chunk hands off to the
/// next. Scheduling an id that is still waiting replaces the pending timer.
pub struct TokioBackgroundExecutor {
    handlers: RwLock<HashMap<String, TaskHandler>>,
    slots: Slots,
}

impl TokioBackgroundExecutor {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn register_task_handler<F, Fut>(&self, task_id: &str, handler: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers
            .write()
            .await
            .insert(task_id.to_string(), Arc::new(move || handler().boxed()));
        Ok(())
    }

    async fn mark(slots: &Slots, id: &TaskId, generation: u64, status: TaskStatus) {
        if let Some(slot) = slots.lock().await.get_mut(id) {
            if slot.generation == generation {
                slot.status = status;
            }
        }
    }

    async fn fire(
        slots: Slots,
        id: TaskId,
        generation: u64,
        handler: TaskHandler,
        delay: Duration,
    ) {
        tokio::time::sleep(delay).await;
        Self::mark(&slots, &id, generation, TaskStatus::Running).await;

        let outcome = match handler().await {
            Ok(()) => TaskStatus::Completed,
            Err(e) => {
                warn!(task_id = %id, error = %e, "Deferred task failed");
                TaskStatus::Failed
            }
        };
        Self::mark(&slots, &id, generation, outcome).await;
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn schedule_once(&self, task_id: &str, delay: Duration) -> Result<TaskId> {
        let handler = self
            .handlers
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!("No handler registered for task: {}", task_id))
            })?;

        let id = TaskId::new(task_id);
        let mut slots = self.slots.lock().await;
        let generation = match slots.get(&id) {
            Some(previous) => {
                if previous.status == TaskStatus::Scheduled {
                    previous.timer.abort();
                }
                previous.generation + 1
            }
            None => 0,
        };

        let timer = tokio::spawn(Self::fire(
            Arc::clone(&self.slots),
            id.clone(),
            generation,
            handler,
            delay,
        ));
        slots.insert(
            id.clone(),
            Slot {
                status: TaskStatus::Scheduled,
                generation,
                timer,
            },
        );

        debug!(task_id, delay_ms = delay.as_millis() as u64, "Armed timer");
        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        let mut slots = self.slots.lock().await;
        let pending = slots
            .get(task_id)
            .is_some_and(|slot| slot.status == TaskStatus::Scheduled);
        if let Some(slot) = pending.then(|| slots.remove(task_id)).flatten() {
            slot.timer.abort();
            debug!(task_id = %task_id, "Cancelled pending task");
        }
        Ok(())
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>> {
        Ok(self.slots.lock().await.get(task_id).map(|slot| slot.status))
    }
}
