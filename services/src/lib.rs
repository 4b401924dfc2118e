//! Request-side services of the grader: admission control over push and
//! comment events, the per-course policy registry it consults, and the
//! admission history store.

pub mod admission_service;
pub mod course_registry;
pub mod history;
