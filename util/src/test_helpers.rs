use crate::config::{AppConfig, SandboxLimits, Secret, WorkspaceRetention};
use std::path::Path;
use std::time::Duration;

/// A synthetic configuration rooted at `persist_dir`, for tests.
///
/// The uid is the current user's so workspaces need no ownership change, the
/// sandbox timeout is short, and no network or host aliases are configured.
pub fn test_config(persist_dir: &Path) -> AppConfig {
    AppConfig {
        env: "test".into(),
        project_name: "grader-test".into(),
        log_level: "debug".into(),
        log_file: "grader-test.log".into(),
        log_to_stdout: false,
        host: "127.0.0.1".into(),
        port: 0,
        persist_dir: persist_dir.to_path_buf(),
        host_dir: persist_dir.to_path_buf(),
        uid: current_uid(),
        bot_token: Secret::new("test-token"),
        docker_network: None,
        hosts_allow: Vec::new(),
        container_runtime: "docker".into(),
        git_binary: "git".into(),
        clone_timeout: Duration::from_secs(30),
        max_concurrent_tasks: 2,
        feedback_cooldown: Duration::from_secs(12 * 60 * 60),
        sandbox: SandboxLimits {
            timeout: Duration::from_secs(10),
            ..SandboxLimits::default()
        },
        workspace_retention: WorkspaceRetention::Keep,
        courses_file: None,
    }
}

/// Effective uid of the test process.
pub fn current_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}
