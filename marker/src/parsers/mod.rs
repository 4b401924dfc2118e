//! Parsers for artifacts produced inside the sandbox.

pub mod grade_report_parser;
