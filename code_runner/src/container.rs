//! Sandbox run parameters and the container runtime client.

use crate::command::{CommandError, CommandExecutor, RunOptions};
use crate::error::GradeError;
use common::task_id::TaskId;
use common::types::{ContainerInput, ContainerState};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use util::config::{AppConfig, SandboxLimits};
use util::paths;

/// Exit status the runtime CLI uses for its own failures (daemon, image, flags).
/// A graded program may exit with it too; the cidfile tells the two apart.
const RUNTIME_FAILURE: i32 = 125;
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the container runtime needs to start one grading sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRunConfig {
    pub name: String,
    /// Written by the runtime once the sandbox exists. Local path, not mounted.
    pub cid_file: PathBuf,
    pub image: String,
    pub env: Vec<(String, String)>,
    /// Host path and container path of each bind mount.
    pub volumes: Vec<(PathBuf, String)>,
    pub network: Option<String>,
    pub hosts: Vec<String>,
    pub uid: u32,
    pub limits: SandboxLimits,
}

impl SandboxRunConfig {
    pub fn build(task_id: &TaskId, input: &ContainerInput, config: &AppConfig) -> Self {
        let id = task_id.as_str();
        Self {
            name: format!("grader-{id}"),
            cid_file: paths::cid_path(&config.persist_dir, id),
            image: input.container_config.docker_image.clone(),
            env: vec![
                ("ASSIGNMENT".into(), input.deliv_id.clone()),
                (
                    "FEEDBACK_MODE".into(),
                    input.container_config.feedback_mode().to_string(),
                ),
                ("USER_UID".into(), config.uid.to_string()),
            ],
            volumes: vec![
                (
                    paths::input_dir(&config.host_dir, id),
                    format!("/{}", paths::INPUT_DIR),
                ),
                (
                    paths::output_dir(&config.host_dir, id),
                    format!("/{}", paths::OUTPUT_DIR),
                ),
            ],
            network: config.docker_network.clone(),
            hosts: config.hosts_allow.clone(),
            uid: config.uid,
            limits: config.sandbox.clone(),
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--cidfile".to_string(),
            self.cid_file.display().to_string(),
        ];
        for (key, value) in &self.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in &self.volumes {
            args.push("--volume".into());
            args.push(format!("{}:{container}", host.display()));
        }
        if let Some(network) = &self.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        for host in &self.hosts {
            args.push("--add-host".into());
            args.push(host.clone());
        }
        args.extend([
            "--user".to_string(),
            self.uid.to_string(),
            format!("--memory={}", self.limits.max_memory),
            format!("--cpus={}", self.limits.max_cpus),
            format!("--pids-limit={}", self.limits.max_processes),
            "--security-opt=no-new-privileges".to_string(),
            self.image.clone(),
        ]);
        args
    }
}

/// How a sandbox run ended, when it ran at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRun {
    pub state: ContainerState,
    pub exit_code: i32,
    pub output: String,
}

pub struct ContainerLauncher {
    runtime: String,
    executor: CommandExecutor,
}

impl ContainerLauncher {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            executor: CommandExecutor::new(),
        }
    }

    /// Runs the sandbox to completion, bounded by the configured limits.
    ///
    /// A timed out or overflowing run is torn down with [`terminate`](Self::terminate)
    /// before this returns.
    pub async fn launch(
        &self,
        run: &SandboxRunConfig,
        cancel: CancellationToken,
    ) -> Result<SandboxRun, GradeError> {
        let options = RunOptions {
            timeout: Some(run.limits.timeout),
            max_output_bytes: Some(run.limits.max_output_bytes),
            cancel: Some(cancel),
            ..RunOptions::default()
        };

        // The runtime refuses to start when the cidfile is already there.
        remove_cid_file(&run.cid_file)?;
        let result = self.executor.run(&self.runtime, &run.to_args(), options).await;
        let created = run.cid_file.exists();
        remove_cid_file(&run.cid_file)?;

        match result {
            Ok(out) => Ok(SandboxRun {
                state: ContainerState::Success,
                exit_code: out.code,
                output: out.output,
            }),
            Err(CommandError::Exited { code, output, .. })
                if code == RUNTIME_FAILURE && !created =>
            {
                Err(GradeError::SandboxUnavailable(output))
            }
            Err(CommandError::Exited { code, output, .. }) => Ok(SandboxRun {
                state: ContainerState::Fail,
                exit_code: code,
                output,
            }),
            Err(CommandError::TimedOut { output, .. }) => {
                self.terminate(&run.name).await;
                Ok(SandboxRun {
                    state: ContainerState::Timeout,
                    exit_code: 128 + libc::SIGKILL,
                    output,
                })
            }
            Err(CommandError::OutputOverflow { output, .. }) => {
                self.terminate(&run.name).await;
                Ok(SandboxRun {
                    state: ContainerState::ConsoleOverflow,
                    exit_code: 128 + libc::SIGKILL,
                    output,
                })
            }
            Err(CommandError::Cancelled { .. }) => {
                self.terminate(&run.name).await;
                Err(GradeError::Cancelled)
            }
            Err(e @ CommandError::Launch { .. }) => Err(e.into()),
        }
    }

    /// Kills and removes the named sandbox together with its anonymous volumes.
    pub async fn terminate(&self, name: &str) {
        for args in [
            vec!["kill".to_string(), name.to_string()],
            vec![
                "rm".to_string(),
                "--force".to_string(),
                "--volumes".to_string(),
                name.to_string(),
            ],
        ] {
            let result = self
                .executor
                .run(&self.runtime, &args, RunOptions::with_timeout(CLEANUP_TIMEOUT))
                .await;
            match result {
                Ok(_) => {}
                Err(e) if e.output().is_some_and(|o| o.contains("No such container")) => {
                    tracing::debug!(container = name, "Sandbox already gone");
                }
                Err(e) => {
                    tracing::error!(container = name, action = %args[0], error = %e, "Sandbox cleanup failed");
                }
            }
        }
    }
}

fn remove_cid_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
