//! Directory layout of the grader's persist root.
//!
//! ```text
//! {root}/{task_id}/assn       cloned submission, mounted at /assn
//! {root}/{task_id}/output     sandbox results, mounted at /output
//! {root}/{task_id}/sandbox.cid id of the sandbox, written by the runtime CLI
//! ```
//!
//! The same layout is used for the local persist dir and for the host-side
//! directory the container runtime mounts from.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const INPUT_DIR: &str = "assn";
pub const OUTPUT_DIR: &str = "output";
pub const REPORT_FILE: &str = "report.json";
pub const STDIO_FILE: &str = "stdio.txt";
pub const RESULT_FILE: &str = "result.json";
pub const CID_FILE: &str = "sandbox.cid";

/// Create a directory (and all parents) if it doesn't exist, and return the path.
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = path.as_ref();
    fs::create_dir_all(p)?;
    Ok(p.to_path_buf())
}

/// Top-level folder of one task: {root}/{task_id}
pub fn task_dir(root: &Path, task_id: &str) -> PathBuf {
    root.join(task_id)
}

pub fn input_dir(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join(INPUT_DIR)
}

pub fn output_dir(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join(OUTPUT_DIR)
}

pub fn cid_path(root: &Path, task_id: &str) -> PathBuf {
    task_dir(root, task_id).join(CID_FILE)
}

pub fn report_path(root: &Path, task_id: &str) -> PathBuf {
    output_dir(root, task_id).join(REPORT_FILE)
}

/// Path of the captured console log relative to the persist root, as served
/// by static retrieval.
pub fn stdio_ref(task_id: &str) -> String {
    format!("{task_id}/{OUTPUT_DIR}/{STDIO_FILE}")
}
