//! # Marker Library
//!
//! Turns the artifacts of a finished sandbox run into a [`common::types::ContainerOutput`].
//!
//! ## Key Concepts
//! - **ReportParser**: reads the grading image's `report.json` into a validated [`parsers::grade_report_parser::SandboxReport`].
//! - **ResultAssembler**: combines the parsed report with the task input and run metadata,
//!   synthesising a degraded report when the run timed out, overflowed or left no usable report.

pub mod assembler;
pub mod error;
pub mod parsers;
pub mod traits;

pub use assembler::{ResultAssembler, RunSummary};
pub use parsers::grade_report_parser::{JsonReportParser, SandboxReport};
