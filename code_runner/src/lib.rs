//! Sandboxed execution of grading tasks.
//!
//! - [`command`]: bounded subprocess execution with process-group cleanup
//! - [`credentials`]: token-bearing clone URLs and log redaction
//! - [`workspace`]: the per-task `assn/` and `output/` tree
//! - [`repository`]: fetching the submission
//! - [`container`]: sandbox run parameters and the runtime client
//! - [`task`] and [`registry`]: task lifecycle and per-id exclusivity
//! - [`grade_task`]: the orchestrator tying them together

pub mod command;
pub mod container;
pub mod credentials;
pub mod error;
pub mod grade_task;
pub mod registry;
pub mod repository;
pub mod task;
pub mod workspace;

pub use error::GradeError;
pub use grade_task::GradeTaskExecutor;
