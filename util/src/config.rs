//! Process-wide grader configuration.
//!
//! `AppConfig` is built exactly once at startup from `.env` and the process
//! environment, then shared behind an `Arc`. Components receive it through
//! their constructors and never consult the environment themselves, so tests
//! can hand them a synthetic value (see [`crate::test_helpers`]).

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// A credential that must never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// What happens to a task's workspace once its output has been produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceRetention {
    /// Leave the whole task directory in place.
    Keep,
    /// Remove the cloned inputs, keep `output/` for static retrieval.
    Inputs,
    /// Remove the task directory entirely.
    All,
}

impl FromStr for WorkspaceRetention {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "inputs" => Ok(Self::Inputs),
            "all" => Ok(Self::All),
            _ => Err(()),
        }
    }
}

/// Resource bounds applied to every sandbox run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub max_memory: u64,
    pub max_cpus: u32,
    pub max_processes: u32,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            max_output_bytes: 5 * 1024 * 1024,
            max_memory: 2 * 1024 * 1024 * 1024,
            max_cpus: 2,
            max_processes: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub host: String,
    pub port: u16,

    /// Root under which every task gets `<task_id>/{assn,output}`.
    pub persist_dir: PathBuf,
    /// The same directory as seen by the container runtime's host; used to
    /// build bind-mount sources.
    pub host_dir: PathBuf,
    /// Numeric uid the sandbox runs as and that owns each workspace.
    pub uid: u32,
    pub bot_token: Secret,
    pub docker_network: Option<String>,
    pub hosts_allow: Vec<String>,
    pub container_runtime: String,
    pub git_binary: String,
    /// Bound on each git command used to fetch a submission.
    pub clone_timeout: Duration,
    pub max_concurrent_tasks: usize,
    pub feedback_cooldown: Duration,
    pub sandbox: SandboxLimits,
    pub workspace_retention: WorkspaceRetention,
    pub courses_file: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the configuration from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let persist_dir = PathBuf::from(
            get("GRADER_PERSIST_DIR").ok_or(ConfigError::Missing("GRADER_PERSIST_DIR"))?,
        );
        let host_dir = get("GRADER_HOST_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| persist_dir.clone());

        let uid_raw = get("UID").ok_or(ConfigError::Missing("UID"))?;
        let uid = parse("UID", &uid_raw)?;

        let token_raw = get("GH_BOT_TOKEN").ok_or(ConfigError::Missing("GH_BOT_TOKEN"))?;
        let bot_token = Secret::new(token_raw.trim().trim_start_matches("token ").trim());

        let defaults = SandboxLimits::default();
        let sandbox = SandboxLimits {
            timeout: Duration::from_secs(parse_or(
                &get,
                "SANDBOX_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            max_output_bytes: parse_or(&get, "SANDBOX_MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            max_memory: parse_or(&get, "SANDBOX_MAX_MEMORY", defaults.max_memory)?,
            max_cpus: parse_or(&get, "SANDBOX_MAX_CPUS", defaults.max_cpus)?,
            max_processes: parse_or(&get, "SANDBOX_MAX_PROCESSES", defaults.max_processes)?,
        };

        let workspace_retention = match get("WORKSPACE_RETENTION") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "WORKSPACE_RETENTION",
                value: raw,
            })?,
            None => WorkspaceRetention::Inputs,
        };

        let max_concurrent_tasks: usize = parse_or(&get, "MAX_CONCURRENT_TASKS", 4)?;
        if max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_TASKS",
                value: "0".into(),
            });
        }

        Ok(Self {
            env: get("APP_ENV").unwrap_or_else(|| "development".into()),
            project_name: get("PROJECT_NAME").unwrap_or_else(|| "grader".into()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_file: get("LOG_FILE").unwrap_or_else(|| "grader.log".into()),
            log_to_stdout: get("LOG_TO_STDOUT").is_some_and(|v| v == "true"),
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse_or(&get, "PORT", 3001)?,
            persist_dir,
            host_dir,
            uid,
            bot_token,
            docker_network: get("DOCKER_NET"),
            hosts_allow: get("HOSTS_ALLOW")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            container_runtime: get("CONTAINER_RUNTIME").unwrap_or_else(|| "docker".into()),
            git_binary: get("GIT_BINARY").unwrap_or_else(|| "git".into()),
            clone_timeout: Duration::from_secs(parse_or(&get, "GIT_CLONE_TIMEOUT_SECS", 300)?),
            max_concurrent_tasks,
            feedback_cooldown: Duration::from_secs(parse_or(&get, "FEEDBACK_COOLDOWN_SECS", 86_400)?),
            sandbox,
            workspace_retention,
            courses_file: get("COURSES_FILE").map(PathBuf::from),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("GRADER_PERSIST_DIR", "/var/grader"),
        ("UID", "1000"),
        ("GH_BOT_TOKEN", "token abc123"),
    ];

    #[test]
    fn required_keys_and_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.persist_dir, PathBuf::from("/var/grader"));
        assert_eq!(cfg.host_dir, cfg.persist_dir);
        assert_eq!(cfg.uid, 1000);
        assert_eq!(cfg.bot_token.expose(), "abc123");
        assert_eq!(cfg.container_runtime, "docker");
        assert_eq!(cfg.max_concurrent_tasks, 4);
        assert_eq!(cfg.feedback_cooldown, Duration::from_secs(86_400));
        assert_eq!(cfg.clone_timeout, Duration::from_secs(300));
        assert_eq!(cfg.sandbox, SandboxLimits::default());
        assert_eq!(cfg.workspace_retention, WorkspaceRetention::Inputs);
        assert!(cfg.hosts_allow.is_empty());
        assert!(cfg.docker_network.is_none());
    }

    #[test]
    fn missing_required_key_is_reported() {
        let err = AppConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GH_BOT_TOKEN")));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SANDBOX_TIMEOUT_SECS", "soon"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err.to_string(), "SANDBOX_TIMEOUT_SECS has an invalid value 'soon'");
    }

    #[test]
    fn lists_and_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("GRADER_HOST_DIR", "/host/grader"),
            ("DOCKER_NET", "grading_net"),
            ("HOSTS_ALLOW", "cs310.ugrad.cs.ubc.ca:142.103.6.72, , other:10.0.0.1"),
            ("WORKSPACE_RETENTION", "ALL"),
            ("MAX_CONCURRENT_TASKS", "2"),
            ("GIT_CLONE_TIMEOUT_SECS", "45"),
        ]);
        let cfg = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.host_dir, PathBuf::from("/host/grader"));
        assert_eq!(cfg.docker_network.as_deref(), Some("grading_net"));
        assert_eq!(
            cfg.hosts_allow,
            vec!["cs310.ugrad.cs.ubc.ca:142.103.6.72", "other:10.0.0.1"]
        );
        assert_eq!(cfg.workspace_retention, WorkspaceRetention::All);
        assert_eq!(cfg.max_concurrent_tasks, 2);
        assert_eq!(cfg.clone_timeout, Duration::from_secs(45));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_CONCURRENT_TASKS", "0"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let cfg = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert!(!format!("{cfg:?}").contains("abc123"));
    }

    #[test]
    #[serial]
    fn reads_process_environment() {
        unsafe {
            std::env::set_var("GRADER_PERSIST_DIR", "/tmp/grader-env-test");
            std::env::set_var("UID", "4242");
            std::env::set_var("GH_BOT_TOKEN", "xyz");
        }
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.persist_dir, PathBuf::from("/tmp/grader-env-test"));
        assert_eq!(cfg.uid, 4242);
        unsafe {
            std::env::remove_var("GRADER_PERSIST_DIR");
            std::env::remove_var("UID");
            std::env::remove_var("GH_BOT_TOKEN");
        }
    }
}
