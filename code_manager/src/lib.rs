//! The grading service: HTTP surface, shared state and the bounded execution
//! queue in front of [`code_runner::GradeTaskExecutor`].

pub mod api;
pub mod manager;
pub mod response;
pub mod state;
