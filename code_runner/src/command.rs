//! Bounded external process execution.
//!
//! [`CommandExecutor::run`] starts a program in its own process group, drains
//! stdout and stderr into one buffer in arrival order, and classifies how the
//! program ended. Whatever the outcome, the whole process group is killed
//! before `run` returns, so no descendant outlives the command.

use crate::credentials::redact;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

/// How long to keep collecting output after the process has stopped.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub max_output_bytes: Option<usize>,
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub output: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program} exited with code {code}: {output}")]
    Exited {
        program: String,
        code: i32,
        output: String,
    },
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        output: String,
    },
    #[error("{program} wrote more than {limit} bytes of output")]
    OutputOverflow {
        program: String,
        limit: usize,
        output: String,
    },
    #[error("{program} was cancelled")]
    Cancelled { program: String, output: String },
}

impl CommandError {
    /// Output captured before the command stopped, if it ever started.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Exited { output, .. }
            | CommandError::TimedOut { output, .. }
            | CommandError::OutputOverflow { output, .. }
            | CommandError::Cancelled { output, .. } => Some(output),
            CommandError::Launch { .. } => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Exited { code, .. } => Some(*code),
            _ => None,
        }
    }
}

enum Stop {
    Exited(ExitStatus),
    TimedOut,
    Overflow,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Runs `program` with `args` to completion.
    ///
    /// Exit code 0 resolves to [`CommandOutput`]; every other ending is a
    /// [`CommandError`] carrying the trimmed combined output captured so far.
    /// A child killed by a signal reports `128 + signal`.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        options: RunOptions,
    ) -> Result<CommandOutput, CommandError> {
        let printable = redact(&format!("{program} {}", args.join(" ")));
        tracing::info!(command = %printable, "Executing command");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        command.envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = command.group_spawn().map_err(|source| {
            tracing::error!(command = %printable, error = %source, "Failed to launch command");
            CommandError::Launch {
                program: program.to_string(),
                source,
            }
        })?;

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(stdout) = child.inner().stdout.take() {
            forward(stdout, tx.clone());
        }
        if let Some(stderr) = child.inner().stderr.take() {
            forward(stderr, tx.clone());
        }
        drop(tx);

        let limit = options.max_output_bytes.unwrap_or(usize::MAX);
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let cancel = options.cancel.unwrap_or_default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut streams_open = true;

        let stop = loop {
            tokio::select! {
                chunk = rx.recv(), if streams_open => match chunk {
                    Some(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        if buffer.len() > limit {
                            break Stop::Overflow;
                        }
                    }
                    None => streams_open = false,
                },
                status = child.inner().wait() => match status {
                    Ok(status) => break Stop::Exited(status),
                    Err(e) => {
                        tracing::error!(command = %printable, error = %e, "Failed waiting for command");
                        break Stop::Cancelled;
                    }
                },
                _ = until(deadline) => break Stop::TimedOut,
                _ = cancel.cancelled() => break Stop::Cancelled,
            }
        };

        kill_process_group(&mut child, &printable, matches!(stop, Stop::Exited(_))).await;

        while buffer.len() <= limit {
            match timeout(DRAIN_GRACE, rx.recv()).await {
                Ok(Some(bytes)) => buffer.extend_from_slice(&bytes),
                _ => break,
            }
        }

        let overflowed = buffer.len() > limit;
        if overflowed {
            buffer.truncate(limit);
        }
        let output = String::from_utf8_lossy(&buffer).trim().to_string();
        let program = program.to_string();

        match stop {
            Stop::Exited(_) | Stop::Overflow if overflowed => {
                tracing::warn!(command = %printable, limit, "Command output exceeded limit");
                Err(CommandError::OutputOverflow {
                    program,
                    limit,
                    output,
                })
            }
            Stop::Exited(status) => {
                let code = exit_code(status);
                if code == 0 {
                    Ok(CommandOutput { code, output })
                } else {
                    tracing::warn!(
                        command = %printable,
                        code,
                        output = %redact(&output),
                        "Command exited with nonzero code"
                    );
                    Err(CommandError::Exited {
                        program,
                        code,
                        output,
                    })
                }
            }
            Stop::Overflow => Err(CommandError::OutputOverflow {
                program,
                limit,
                output,
            }),
            Stop::TimedOut => {
                let timeout = options.timeout.unwrap_or_default();
                tracing::warn!(command = %printable, timeout_secs = timeout.as_secs(), "Command timed out");
                Err(CommandError::TimedOut {
                    program,
                    timeout,
                    output,
                })
            }
            Stop::Cancelled => {
                tracing::warn!(command = %printable, "Command cancelled");
                Err(CommandError::Cancelled { program, output })
            }
        }
    }
}

fn forward<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

/// Sends SIGKILL to every process left in the command's group.
///
/// When the leader is still running it is also reaped. After a normal exit the
/// group is usually empty already, so a failed signal is only worth a debug line.
async fn kill_process_group(child: &mut AsyncGroupChild, command: &str, leader_exited: bool) {
    if leader_exited {
        if let Err(e) = child.start_kill() {
            tracing::debug!(command, error = %e, "No process group left to kill");
        }
    } else if let Err(e) = child.kill().await {
        tracing::error!(command, error = %e, "Failed to kill process group");
    }
}
