//! Grading task orchestration.
//!
//! [`GradeTaskExecutor::execute`] drives one task from admission to a
//! persisted [`ContainerOutput`]:
//!
//! 1. claim the task id and create its workspace
//! 2. clone the submission with a token-bearing URL
//! 3. launch the sandbox under the configured limits
//! 4. write `stdio.txt`, parse `report.json`, assemble and write `result.json`
//! 5. release the workspace per retention policy
//!
//! Any failure before a sandbox outcome exists is a [`GradeError`].

use crate::container::{ContainerLauncher, SandboxRunConfig};
use crate::credentials::inject_token;
use crate::error::GradeError;
use crate::registry::TaskRegistry;
use crate::repository::{GitRepository, RepositoryFetcher};
use crate::task::Task;
use crate::workspace::Workspace;
use chrono::Utc;
use common::format_validation_errors;
use common::task_id::TaskId;
use common::types::{ContainerInput, ContainerOutput};
use marker::{JsonReportParser, ResultAssembler, RunSummary};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use util::config::AppConfig;
use util::paths;
use validator::Validate;

pub struct GradeTaskExecutor {
    config: Arc<AppConfig>,
    registry: TaskRegistry,
    fetcher: Arc<dyn RepositoryFetcher>,
    launcher: ContainerLauncher,
}

impl GradeTaskExecutor {
    pub fn new(config: Arc<AppConfig>, fetcher: Arc<dyn RepositoryFetcher>) -> Self {
        let launcher = ContainerLauncher::new(config.container_runtime.clone());
        Self {
            config,
            registry: TaskRegistry::new(),
            fetcher,
            launcher,
        }
    }

    /// An executor that clones with the configured git binary.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let git = GitRepository::new(config.git_binary.clone(), config.clone_timeout);
        Self::new(config, Arc::new(git))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub async fn execute(
        &self,
        task_id: &TaskId,
        input: ContainerInput,
        cancel: CancellationToken,
    ) -> Result<ContainerOutput, GradeError> {
        let result = self.try_execute(task_id, input, cancel).await;
        match &result {
            Ok(output) => tracing::info!(
                task_id = %task_id,
                state = %output.state,
                score = output.report.score_overall,
                "Grading task finished"
            ),
            Err(e) if e.is_busy() => {}
            Err(e) => tracing::error!(task_id = %task_id, error = %e, "Grading task failed"),
        }
        result
    }

    async fn try_execute(
        &self,
        task_id: &TaskId,
        input: ContainerInput,
        cancel: CancellationToken,
    ) -> Result<ContainerOutput, GradeError> {
        input
            .validate()
            .map_err(|e| GradeError::InvalidInput(format_validation_errors(&e)))?;

        let _lease = self.registry.claim(task_id)?;
        let mut task = Task::new(task_id.clone(), input);
        tracing::info!(
            task_id = %task_id,
            repo = %task.input.push_info.repo,
            deliv_id = %task.input.deliv_id,
            "Grading task started"
        );

        let result = match Workspace::create(&self.config.persist_dir, task_id) {
            Ok(workspace) => {
                let result = self.run(&mut task, &workspace, cancel).await;
                if let Err(e) = workspace.release(self.config.workspace_retention) {
                    tracing::warn!(task_id = %task_id, error = %e, "Failed to release workspace");
                }
                result
            }
            Err(e) => Err(e.into()),
        };

        if result.is_err() {
            if let Err(e) = task.fail() {
                tracing::warn!(task_id = %task_id, error = %e, "Could not mark task as errored");
            }
        }
        result
    }

    async fn run(
        &self,
        task: &mut Task,
        workspace: &Workspace,
        cancel: CancellationToken,
    ) -> Result<ContainerOutput, GradeError> {
        let push = &task.input.push_info;
        let token = task
            .input
            .github_keys
            .as_ref()
            .map(|keys| keys.org_key.as_str())
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| self.config.bot_token.expose());

        {
            let url = inject_token(&push.clone_url(), token)?;
            self.fetcher
                .fetch(&url, &push.commit, &workspace.input_dir(), &cancel)
                .await?;
        }
        workspace.grant_access(self.config.uid)?;

        let run_config = SandboxRunConfig::build(&task.id, &task.input, &self.config);
        task.start()?;
        let run = self.launcher.launch(&run_config, cancel).await?;

        std::fs::write(workspace.stdio_path(), &run.output)?;

        let summary = RunSummary {
            state: run.state,
            exit_code: run.exit_code,
            finished_at: Utc::now().timestamp_millis(),
            stdio_ref: paths::stdio_ref(task.id.as_str()),
            timeout: self.config.sandbox.timeout,
            max_output_bytes: self.config.sandbox.max_output_bytes,
        };
        let report = JsonReportParser.read(workspace.report_path());
        let output = ResultAssembler::assemble(task.id.as_str(), &task.input, &summary, report);

        let body = serde_json::to_vec_pretty(&output).map_err(std::io::Error::other)?;
        std::fs::write(workspace.result_path(), body)?;

        task.finish(output.state)?;
        Ok(output)
    }
}
