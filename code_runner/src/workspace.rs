//! Task-scoped workspace on the persist volume.
//!
//! Each task owns `{persist}/{task_id}/{assn,output}` for its lifetime. The
//! tree is handed to the sandbox uid before launch and released afterwards
//! according to [`WorkspaceRetention`].

use common::task_id::TaskId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use util::config::WorkspaceRetention;
use util::paths;

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    task_id: TaskId,
}

impl Workspace {
    /// Creates a fresh `assn/` and `output/` for `task_id`, discarding any
    /// leftovers of an earlier run with the same id.
    ///
    /// Callers must hold the task's lease.
    pub fn create(persist_dir: &Path, task_id: &TaskId) -> io::Result<Self> {
        let workspace = Self {
            root: persist_dir.to_path_buf(),
            task_id: task_id.clone(),
        };
        for dir in [workspace.input_dir(), workspace.output_dir()] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            paths::ensure_dir(&dir)?;
        }
        tracing::debug!(task_id = %task_id, path = %workspace.task_dir().display(), "Workspace created");
        Ok(workspace)
    }

    pub fn task_dir(&self) -> PathBuf {
        paths::task_dir(&self.root, self.task_id.as_str())
    }

    pub fn input_dir(&self) -> PathBuf {
        paths::input_dir(&self.root, self.task_id.as_str())
    }

    pub fn output_dir(&self) -> PathBuf {
        paths::output_dir(&self.root, self.task_id.as_str())
    }

    pub fn report_path(&self) -> PathBuf {
        paths::report_path(&self.root, self.task_id.as_str())
    }

    pub fn stdio_path(&self) -> PathBuf {
        self.output_dir().join(paths::STDIO_FILE)
    }

    pub fn result_path(&self) -> PathBuf {
        self.output_dir().join(paths::RESULT_FILE)
    }

    /// Gives `uid` ownership of the whole task tree. A no-op when the grader
    /// already runs as `uid`.
    pub fn grant_access(&self, uid: u32) -> io::Result<()> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid == uid {
            return Ok(());
        }
        chown_recursive(&self.task_dir(), uid)
    }

    pub fn release(&self, retention: WorkspaceRetention) -> io::Result<()> {
        let target = match retention {
            WorkspaceRetention::Keep => return Ok(()),
            WorkspaceRetention::Inputs => self.input_dir(),
            WorkspaceRetention::All => self.task_dir(),
        };
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        tracing::debug!(task_id = %self.task_id, ?retention, "Workspace released");
        Ok(())
    }
}

fn chown_recursive(path: &Path, uid: u32) -> io::Result<()> {
    std::os::unix::fs::lchown(path, Some(uid), None)?;
    if fs::symlink_metadata(path)?.is_dir() {
        for entry in fs::read_dir(path)? {
            chown_recursive(&entry?.path(), uid)?;
        }
    }
    Ok(())
}
