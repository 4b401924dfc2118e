//! Fetching the submission into a workspace.

use crate::command::{CommandError, CommandExecutor, RunOptions};
use crate::credentials::{AuthenticatedUrl, redact};
use crate::error::GradeError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Places the code state identified by `commit` at `dest`.
///
/// A fetch stopped through `cancel` fails with [`GradeError::Cancelled`].
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &AuthenticatedUrl,
        commit: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), GradeError>;
}

/// Clones with the `git` CLI.
///
/// After checkout `origin` is rewritten to the public URL so the token does
/// not remain in `.git/config`.
pub struct GitRepository {
    git: String,
    executor: CommandExecutor,
    timeout: Duration,
}

impl GitRepository {
    pub fn new(git: impl Into<String>, timeout: Duration) -> Self {
        Self {
            git: git.into(),
            executor: CommandExecutor::new(),
            timeout,
        }
    }

    async fn git(&self, args: &[&str], cancel: &CancellationToken) -> Result<(), GradeError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let options = RunOptions {
            timeout: Some(self.timeout),
            env: vec![("GIT_TERMINAL_PROMPT".into(), "0".into())],
            cancel: Some(cancel.clone()),
            ..RunOptions::default()
        };
        match self.executor.run(&self.git, &args, options).await {
            Ok(_) => Ok(()),
            Err(CommandError::Cancelled { .. }) => Err(GradeError::Cancelled),
            Err(e) => Err(GradeError::Clone(redact(&e.to_string()))),
        }
    }
}

#[async_trait]
impl RepositoryFetcher for GitRepository {
    async fn fetch(
        &self,
        url: &AuthenticatedUrl,
        commit: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), GradeError> {
        let dest_str = dest.to_string_lossy();
        if let Err(e) = self
            .git(&["clone", "--quiet", url.expose(), &dest_str], cancel)
            .await
        {
            if dest.exists() {
                let _ = std::fs::remove_dir_all(dest);
            }
            return Err(e);
        }

        let scrubbed = self
            .git(&["-C", &dest_str, "remote", "set-url", "origin", url.public()], cancel)
            .await;
        if let Err(e) = scrubbed {
            tracing::error!(dest = %dest.display(), "Could not scrub credentials from clone; removing it");
            let _ = std::fs::remove_dir_all(dest);
            return Err(e);
        }

        if !commit.is_empty() {
            self.git(&["-C", &dest_str, "checkout", "--quiet", commit], cancel)
                .await?;
        }

        tracing::info!(url = %url, commit, "Repository fetched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.name=grader", "-c", "user.email=grader@example.com"])
            .args(args)
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn origin_repo(dir: &Path) -> (String, String) {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet"]);
        std::fs::write(dir.join("a.txt"), "first").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "--quiet", "-m", "first"]);
        let first = git(dir, &["rev-parse", "HEAD"]);
        std::fs::write(dir.join("a.txt"), "second").unwrap();
        git(dir, &["commit", "--quiet", "-am", "second"]);
        let second = git(dir, &["rev-parse", "HEAD"]);
        (first, second)
    }

    #[tokio::test]
    async fn clones_and_checks_out_requested_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        let (first, _) = origin_repo(&origin);
        let dest = tmp.path().join("assn");

        let url = AuthenticatedUrl::anonymous(origin.to_string_lossy().to_string());
        GitRepository::new("git", Duration::from_secs(30))
            .fetch(&url, &first, &dest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "first");
        assert_eq!(git(&dest, &["remote", "get-url", "origin"]), url.public());
    }

    #[tokio::test]
    async fn unknown_commit_is_a_clone_error() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        origin_repo(&origin);

        let url = AuthenticatedUrl::anonymous(origin.to_string_lossy().to_string());
        let err = GitRepository::new("git", Duration::from_secs(30))
            .fetch(
                &url,
                "0000000000000000000000000000000000000000",
                &tmp.path().join("assn"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::Clone(_)));
    }

    #[tokio::test]
    async fn clone_errors_do_not_leak_the_token() {
        let tmp = tempfile::tempdir().unwrap();
        let url = crate::credentials::inject_token("https://127.0.0.1:9/org/repo.git", "s3cret").unwrap();
        let err = GitRepository::new("git", Duration::from_secs(30))
            .fetch(&url, "", &tmp.path().join("assn"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::Clone(_)));
        assert!(!err.to_string().contains("s3cret"), "{err}");
    }

    #[tokio::test]
    async fn cancelled_fetch_stops_and_leaves_no_clone() {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        let (first, _) = origin_repo(&origin);
        let dest = tmp.path().join("assn");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let url = AuthenticatedUrl::anonymous(origin.to_string_lossy().to_string());
        let err = GitRepository::new("git", Duration::from_secs(30))
            .fetch(&url, &first, &dest, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::Cancelled), "{err}");
        assert!(!dest.exists());
    }
}
