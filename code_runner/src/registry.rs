//! Live task ids.
//!
//! At most one execution per task id may be in flight; a second claim for a
//! live id fails with [`GradeError::TaskBusy`] instead of sharing the workspace.

use crate::error::GradeError;
use common::task_id::TaskId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    live: Arc<Mutex<HashSet<TaskId>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, task_id: &TaskId) -> Result<TaskLease, GradeError> {
        if !self.lock().insert(task_id.clone()) {
            tracing::warn!(task_id = %task_id, "Rejected request for a task that is already running");
            return Err(GradeError::TaskBusy(task_id.to_string()));
        }
        Ok(TaskLease {
            live: Arc::clone(&self.live),
            task_id: task_id.clone(),
        })
    }

    pub fn is_live(&self, task_id: &TaskId) -> bool {
        self.lock().contains(task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<TaskId>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive hold on a task id, released on drop.
#[derive(Debug)]
pub struct TaskLease {
    live: Arc<Mutex<HashSet<TaskId>>>,
    task_id: TaskId,
}

impl TaskLease {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.task_id);
    }
}
