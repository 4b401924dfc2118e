// manager/manager.rs
use crate::manager::queue::{Queue, QueueStats};
use code_runner::{GradeError, GradeTaskExecutor};
use common::task_id::TaskId;
use common::types::{ContainerInput, ContainerOutput};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Runs grading tasks on the tokio runtime, at most `max_concurrent` at a time.
#[derive(Clone)]
pub struct GradeManager {
    queue: Arc<Mutex<Queue>>,
    executor: Arc<GradeTaskExecutor>,
    shutdown: CancellationToken,
}

impl GradeManager {
    pub fn new(executor: Arc<GradeTaskExecutor>, max_concurrent: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue::new(max_concurrent))),
            executor,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn stats(&self) -> QueueStats {
        lock(&self.queue).stats()
    }

    /// Cancels every queued and running task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Grades one task, waiting for a free slot first.
    ///
    /// The work runs on its own tokio task, so dropping the returned future
    /// (for example when the HTTP client disconnects) does not interrupt the
    /// sandbox run or its cleanup.
    pub async fn grade(
        &self,
        task_id: TaskId,
        input: ContainerInput,
    ) -> Result<ContainerOutput, GradeError> {
        let executor = Arc::clone(&self.executor);
        let cancel = self.shutdown.child_token();
        self.submit(async move { executor.execute(&task_id, input, cancel).await })
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Grading task aborted");
                Err(GradeError::Internal(format!("grading task aborted: {e}")))
            })
    }

    /// Queues an admitted task and returns immediately. The outcome is
    /// persisted under the task's output directory.
    pub fn dispatch(&self, task_id: TaskId, input: ContainerInput) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.grade(task_id.clone(), input).await {
                tracing::debug!(task_id = %task_id, error = %e, "Dispatched task ended without output");
            }
        });
    }

    /// Runs `work` once a slot is free and releases the slot when it ends,
    /// including on panic.
    pub async fn submit<F, T>(&self, work: F) -> Result<T, JoinError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            let maybe_notify = lock(&queue).try_acquire_slot();

            // Wait outside the lock
            if let Some(notify) = maybe_notify {
                notify.notified().await;
            }

            let _slot = Slot(queue);
            work.await
        })
        .await
    }
}

struct Slot(Arc<Mutex<Queue>>);

impl Drop for Slot {
    fn drop(&mut self) {
        lock(&self.0).release_slot();
    }
}

fn lock(queue: &Mutex<Queue>) -> MutexGuard<'_, Queue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
