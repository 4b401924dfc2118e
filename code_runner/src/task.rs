//! Task lifecycle.
//!
//! ```text
//! Queued ──▶ Running ──▶ Success | Fail | Timeout | ConsoleOverflow | Error
//!    └────────────────────────────────────────────────────────────▶ Error
//! ```

use crate::error::GradeError;
use common::task_id::TaskId;
use common::types::{ContainerInput, ContainerState};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Fail,
    Timeout,
    ConsoleOverflow,
    /// Infrastructure failure. No output exists for the task.
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }

    fn can_transition_to(self, next: TaskState) -> bool {
        match self {
            TaskState::Queued => matches!(next, TaskState::Running | TaskState::Error),
            TaskState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl From<ContainerState> for TaskState {
    fn from(state: ContainerState) -> Self {
        match state {
            ContainerState::Success => TaskState::Success,
            ContainerState::Fail => TaskState::Fail,
            ContainerState::Timeout => TaskState::Timeout,
            ContainerState::ConsoleOverflow => TaskState::ConsoleOverflow,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "QUEUED",
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Fail => "FAIL",
            TaskState::Timeout => "TIMEOUT",
            TaskState::ConsoleOverflow => "CONSOLEOVERFLOW",
            TaskState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub input: ContainerInput,
    state: TaskState,
}

impl Task {
    pub fn new(id: TaskId, input: ContainerInput) -> Self {
        Self {
            id,
            input,
            state: TaskState::Queued,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), GradeError> {
        self.transition(TaskState::Running)
    }

    pub fn finish(&mut self, state: ContainerState) -> Result<(), GradeError> {
        self.transition(state.into())
    }

    pub fn fail(&mut self) -> Result<(), GradeError> {
        self.transition(TaskState::Error)
    }

    fn transition(&mut self, next: TaskState) -> Result<(), GradeError> {
        if !self.state.can_transition_to(next) {
            return Err(GradeError::IllegalTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(task_id = %self.id, from = %self.state, to = %next, "Task state changed");
        self.state = next;
        Ok(())
    }
}
