use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task id '{0}': expected 1-128 characters of [A-Za-z0-9._-]")]
pub struct InvalidTaskId(pub String);

/// Identifier of one grading task.
///
/// A task id doubles as the name of the task's workspace directory, so it is
/// restricted to a path-safe alphabet and can never be `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn parse(raw: &str) -> Result<Self, InvalidTaskId> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_LEN
            && raw != "."
            && raw != ".."
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidTaskId(raw.to_string()))
        }
    }

    /// Derives the system-assigned id for a commit.
    ///
    /// The id is a function of (deliverable, repo, commit) only, so two requests
    /// for the same commit and deliverable always map to the same workspace.
    /// Characters outside the allowed alphabet are replaced with `-`.
    pub fn for_commit(deliv_id: Option<&str>, repo: &str, commit: &str) -> Self {
        let short: String = commit.chars().take(12).collect();
        let raw = format!("{}_{}_{}", deliv_id.unwrap_or("push"), repo, short);
        let mut cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        cleaned.truncate(MAX_LEN);
        Self(cleaned)
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

impl TryFrom<String> for TaskId {
    type Error = InvalidTaskId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaskId::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}
