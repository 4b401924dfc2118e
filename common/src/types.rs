//! # Grading Contracts
//!
//! Wire types exchanged between the course platform and the grader. All field
//! names serialize in camelCase; the legacy `commitSHA` / `commitURL` /
//! `projectURL` spellings are accepted on input.
//!
//! ```json
//! {
//!   "pushInfo": { "branch": "master", "commit": "abe1b09...", "repo": "d0_team999", ... },
//!   "courseId": "310",
//!   "delivId": "d0",
//!   "containerConfig": { "dockerImage": "grader-d0", "custom": {} }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use validator::Validate;

/// A push to a student repository. Identifies one code state to grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    #[serde(default)]
    pub branch: String,
    #[serde(alias = "commitSHA")]
    #[validate(length(min = 1, message = "pushInfo.commit must not be empty"))]
    pub commit: String,
    #[serde(alias = "commitURL")]
    #[validate(url(message = "pushInfo.commitUrl must be a URL"))]
    pub commit_url: String,
    #[serde(alias = "projectURL")]
    #[validate(url(message = "pushInfo.projectUrl must be a URL"))]
    pub project_url: String,
    #[validate(length(min = 1, message = "pushInfo.repo must not be empty"))]
    pub repo: String,
    pub timestamp: i64,
    #[serde(default, alias = "cloneURL", skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "pushInfo.cloneUrl must be a URL"))]
    pub clone_url: Option<String>,
}

impl PushEvent {
    /// URL used to clone the repository.
    ///
    /// Falls back to `<projectUrl>.git` when no explicit clone URL was sent.
    pub fn clone_url(&self) -> String {
        match &self.clone_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}.git", self.project_url.trim_end_matches('/')),
        }
    }
}

/// A comment on a commit asking the bot for (re)grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    #[serde(default)]
    pub repo: String,
    #[serde(alias = "commitSHA")]
    pub commit: String,
    #[serde(alias = "commitURL")]
    pub commit_url: String,
    #[serde(default, alias = "projectURL")]
    pub project_url: String,
    pub user_name: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub deliv_id: Option<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub bot_mentioned: bool,
}

/// Marker that a result was delivered to a user. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub user_name: String,
    pub course_id: String,
    pub deliv_id: String,
    pub timestamp: i64,
    #[serde(alias = "commitURL")]
    pub commit_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub username: String,
    pub csid: String,
    pub snum: String,
    pub profile_url: String,
    pub fname: String,
    pub lname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverableInfo {
    pub solutions_url: String,
    pub deliverable_commit: String,
    pub deliverable_url: String,
    pub deliverable_to_mark: String,
}

/// Access keys sent along with a task. Never printed.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GithubKeys {
    pub deliv_key: String,
    pub solutions_key: String,
    pub org_key: String,
}

impl fmt::Debug for GithubKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GithubKeys { .. }")
    }
}

/// Image and free-form runtime parameters for the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    #[serde(alias = "image")]
    #[validate(length(min = 1, message = "containerConfig.dockerImage must not be empty"))]
    pub docker_image: String,
    #[serde(default)]
    pub custom: Value,
}

impl ContainerConfig {
    /// `custom.container.feedbackMode`, or `"public"` when unset.
    pub fn feedback_mode(&self) -> &str {
        self.custom
            .pointer("/container/feedbackMode")
            .and_then(Value::as_str)
            .filter(|mode| !mode.is_empty())
            .unwrap_or("public")
    }
}

/// Everything needed to grade one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInput {
    #[validate(nested)]
    pub push_info: PushEvent,
    #[validate(length(min = 1, message = "courseId must not be empty"))]
    pub course_id: String,
    #[validate(length(min = 1, message = "delivId must not be empty"))]
    pub deliv_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverable_info: Option<DeliverableInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    #[validate(nested)]
    pub container_config: ContainerConfig,
    #[serde(default, skip_serializing)]
    pub github_keys: Option<GithubKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_num: Option<u32>,
}

/// Normalised scoring summary of one run.
///
/// Scores are non-negative; every test identifier appears in exactly one of
/// the four name lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub score_overall: f64,
    pub score_test: f64,
    pub score_cover: f64,
    #[serde(default)]
    pub pass_names: Vec<String>,
    #[serde(default)]
    pub fail_names: Vec<String>,
    #[serde(default)]
    pub error_names: Vec<String>,
    #[serde(default)]
    pub skip_names: Vec<String>,
    #[serde(default)]
    pub custom: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub data: String,
    #[serde(rename = "content_type")]
    pub content_type: String,
}

/// Terminal classification of a sandbox run that produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerState {
    Success,
    Fail,
    Timeout,
    ConsoleOverflow,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Success => "SUCCESS",
            ContainerState::Fail => "FAIL",
            ContainerState::Timeout => "TIMEOUT",
            ContainerState::ConsoleOverflow => "CONSOLEOVERFLOW",
        };
        f.write_str(s)
    }
}

/// Sandbox diagnostics recorded with every output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub script_version: String,
    pub suite_version: String,
    pub image: String,
    pub exit_code: i32,
}

/// The canonical result of one grading task.
///
/// `commit_url` together with `deliverable` is the external key correlating
/// input, output and feedback records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOutput {
    pub commit_url: String,
    pub timestamp: i64,
    pub report: GradeReport,
    pub feedback: String,
    pub postback_on_complete: bool,
    pub custom: Value,
    pub attachments: Vec<Attachment>,
    pub state: ContainerState,

    pub team: String,
    pub commit: String,
    pub committer: String,
    pub project_url: String,
    pub course_num: u32,
    pub org_name: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub user: String,
    pub deliverable: String,
    pub container: ContainerInfo,
    pub grade_requested: bool,
    pub grade_requested_timestamp: i64,
    pub id_stamp: String,
    pub stdio_ref: String,
}
