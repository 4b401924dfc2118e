//! Infrastructure failures of a grading task.
//!
//! A [`GradeError`] means no `ContainerOutput` was produced. Outcomes of the
//! graded program itself (FAIL, TIMEOUT, CONSOLEOVERFLOW) are not errors.

use crate::command::CommandError;
use crate::credentials::CredentialError;

#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("task {0} is already running")]
    TaskBusy(String),
    #[error("invalid task input: {0}")]
    InvalidInput(String),
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("failed to clone repository: {0}")]
    Clone(String),
    #[error("failed to launch sandbox: {0}")]
    Launch(String),
    #[error("sandbox runtime unavailable: {0}")]
    SandboxUnavailable(String),
    #[error("task was cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("illegal task transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

impl GradeError {
    pub fn is_busy(&self) -> bool {
        matches!(self, GradeError::TaskBusy(_))
    }
}

impl From<CommandError> for GradeError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Launch { .. } => GradeError::Launch(err.to_string()),
            other => GradeError::SandboxUnavailable(other.to_string()),
        }
    }
}
