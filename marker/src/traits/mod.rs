//!
//! Traits Module
//!
//! - [`report_parser`]: the generic trait for turning a raw JSON report into a typed one.

pub mod report_parser;
