//! Marker Error Types
//!
//! [`MarkerError`] covers everything that can go wrong while reading and
//! validating the report artifact a sandbox run leaves behind. None of these
//! are infrastructure faults: the assembler turns them into a degraded result.

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    /// The report file could not be read.
    #[error("could not read report: {0}")]
    Io(#[from] std::io::Error),
    /// The report is not valid JSON.
    #[error("report is not valid JSON: {0}")]
    InvalidJson(String),
    /// A required field is missing.
    #[error("report is missing '{0}'")]
    MissingField(String),
    /// A field is present but has the wrong type or an out-of-range value.
    #[error("report field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
    /// A test identifier was listed more than once.
    #[error("test '{name}' is listed in both {first} and {second}")]
    DuplicateTestName {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}
