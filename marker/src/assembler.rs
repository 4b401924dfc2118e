//! Result assembly.
//!
//! [`ResultAssembler`] turns one finished sandbox run into the canonical
//! [`ContainerOutput`]. Audit fields come from the task input and the run
//! metadata; only the grade itself comes from the report. A run that timed out,
//! overflowed its console, or left no usable report still gets a populated
//! report and feedback.

use crate::error::MarkerError;
use crate::parsers::grade_report_parser::SandboxReport;
use common::types::{ContainerInfo, ContainerInput, ContainerOutput, ContainerState, GradeReport};
use serde_json::json;
use std::time::Duration;

/// What the executor knows about a run once the sandbox has stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: ContainerState,
    pub exit_code: i32,
    /// Epoch milliseconds.
    pub finished_at: i64,
    pub stdio_ref: String,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(
        task_id: &str,
        input: &ContainerInput,
        run: &RunSummary,
        report: Result<SandboxReport, MarkerError>,
    ) -> ContainerOutput {
        let (state, report) = match (run.state, report) {
            (ContainerState::Success, Ok(report)) => (ContainerState::Success, Ok(report)),
            (ContainerState::Success, Err(e)) => (
                ContainerState::Fail,
                Err(format!(
                    "The grading run finished but its report could not be used: {e}."
                )),
            ),
            (ContainerState::Fail, Ok(report)) => (ContainerState::Fail, Ok(report)),
            (ContainerState::Fail, Err(e)) => (
                ContainerState::Fail,
                Err(format!(
                    "The grading run failed with exit code {} and produced no usable report ({e}).",
                    run.exit_code
                )),
            ),
            (ContainerState::Timeout, _) => (
                ContainerState::Timeout,
                Err(format!(
                    "The grading run did not finish within {} seconds and was stopped. \
                     Check your code for infinite loops or very slow tests.",
                    run.timeout.as_secs()
                )),
            ),
            (ContainerState::ConsoleOverflow, _) => (
                ContainerState::ConsoleOverflow,
                Err(format!(
                    "The grading run wrote more than {} bytes of console output and was stopped. \
                     Remove excessive logging from your code.",
                    run.max_output_bytes
                )),
            ),
        };

        let push = &input.push_info;
        let user = input
            .user_info
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_default();

        let mut output = ContainerOutput {
            commit_url: push.commit_url.clone(),
            timestamp: run.finished_at,
            report: GradeReport::default(),
            feedback: String::new(),
            postback_on_complete: false,
            custom: json!({}),
            attachments: Vec::new(),
            state,
            team: input.team_id.clone().unwrap_or_else(|| push.repo.clone()),
            commit: push.commit.clone(),
            committer: user.clone(),
            project_url: push.project_url.clone(),
            course_num: input
                .course_num
                .or_else(|| input.course_id.parse().ok())
                .unwrap_or(0),
            org_name: org_name(&push.project_url),
            repo: push.repo.clone(),
            reference: push.commit_url.clone(),
            user,
            deliverable: input.deliv_id.clone(),
            container: ContainerInfo {
                script_version: String::new(),
                suite_version: String::new(),
                image: input.container_config.docker_image.clone(),
                exit_code: run.exit_code,
            },
            grade_requested: false,
            grade_requested_timestamp: -1,
            id_stamp: format!("{}|{}", run.finished_at, task_id),
            stdio_ref: run.stdio_ref.clone(),
        };

        match report {
            Ok(report) => {
                output.report = report.grade;
                output.feedback = report.feedback.unwrap_or_default();
                output.postback_on_complete = report.postback_on_complete.unwrap_or(false);
                output.attachments = report.attachments;
                if let Some(custom) = report.output_custom {
                    output.custom = custom;
                }
                output.container.script_version = report.script_version.unwrap_or_default();
                output.container.suite_version = report.suite_version.unwrap_or_default();
            }
            Err(feedback) => {
                tracing::warn!(task_id, state = %state, "{feedback}");
                output.feedback = feedback;
            }
        }

        output
    }
}

/// The organisation segment of a project URL (`https://host/<org>/<repo>`).
fn org_name(project_url: &str) -> String {
    let path = project_url
        .split_once("://")
        .map_or(project_url, |(_, rest)| rest);
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .nth(1)
        .unwrap_or_default()
        .to_string()
}
