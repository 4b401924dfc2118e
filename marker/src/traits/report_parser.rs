//! Report Parser Trait
//!
//! This module defines the [`ReportParser`] trait, which provides a generic interface for parsing JSON report data into strongly-typed Rust structures.
//! Implementations of this trait are responsible for validating the input JSON and converting it into the appropriate domain model, returning detailed errors on failure.
//!
//! # Example
//!
//! ```rust
//! use serde_json::Value;
//! use marker::error::MarkerError;
//! use marker::traits::report_parser::ReportParser;
//!
//! struct MyReportParser;
//! struct MyReport;
//!
//! impl ReportParser<MyReport> for MyReportParser {
//!     fn parse(&self, raw: &Value) -> Result<MyReport, MarkerError> {
//!         Ok(MyReport)
//!     }
//! }
//! ```

use crate::error::MarkerError;
use serde_json::Value;

/// A trait for parsing JSON report data into a strongly-typed Rust structure.
///
/// # Type Parameters
///
/// * `T` - The output type produced by the parser.
pub trait ReportParser<T> {
    /// Parse a JSON value into the target type.
    ///
    /// # Errors
    ///
    /// Returns a [`MarkerError`] if the input does not conform to the expected schema.
    fn parse(&self, raw: &Value) -> Result<T, MarkerError>;
}
