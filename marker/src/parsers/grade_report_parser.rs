//! Grade Report Parser
//!
//! This module provides the [`JsonReportParser`] for the `report.json` file a
//! grading image writes into its `/output` volume.
//!
//! # JSON Schema
//!
//! ```json
//! {
//!   "scoreOverall": 50,
//!   "scoreTest": 50,
//!   "scoreCover": 50,
//!   "passNames": ["..."],
//!   "failNames": [],
//!   "errorNames": [],
//!   "skipNames": [],
//!   "custom": [],
//!   "outputCustom": { "any": "object" },
//!   "feedback": "markdown shown to the student",
//!   "postbackOnComplete": false,
//!   "attachments": [{ "name": "...", "data": "...", "content_type": "text/plain" }],
//!   "scriptVersion": "1.2",
//!   "suiteVersion": "abc123"
//! }
//! ```
//!
//! - The three scores are required, finite and non-negative.
//! - Name lists may be omitted; a test identifier may appear in at most one list.
//! - Everything below `custom` is optional. `custom` lands in the grade report,
//!   `outputCustom` in the output itself.

use crate::error::MarkerError;
use crate::traits::report_parser::ReportParser;
use common::types::{Attachment, GradeReport};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// A parsed report plus the output-level fields a grading image may set.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxReport {
    pub grade: GradeReport,
    pub feedback: Option<String>,
    pub postback_on_complete: Option<bool>,
    pub attachments: Vec<Attachment>,
    pub output_custom: Option<Value>,
    pub script_version: Option<String>,
    pub suite_version: Option<String>,
}

pub struct JsonReportParser;

impl JsonReportParser {
    /// Reads and parses a report file.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<SandboxReport, MarkerError> {
        let content = std::fs::read_to_string(path)?;
        let raw: Value =
            serde_json::from_str(&content).map_err(|e| MarkerError::InvalidJson(e.to_string()))?;
        self.parse(&raw)
    }
}

impl ReportParser<SandboxReport> for JsonReportParser {
    fn parse(&self, raw: &Value) -> Result<SandboxReport, MarkerError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| MarkerError::InvalidJson("top-level JSON must be an object".into()))?;

        let score_overall = score(obj, "scoreOverall")?;
        let score_test = score(obj, "scoreTest")?;
        let score_cover = score(obj, "scoreCover")?;

        let pass_names = names(obj, "passNames")?;
        let fail_names = names(obj, "failNames")?;
        let error_names = names(obj, "errorNames")?;
        let skip_names = names(obj, "skipNames")?;

        let mut seen: HashMap<&str, &'static str> = HashMap::new();
        for (list, entries) in [
            ("passNames", &pass_names),
            ("failNames", &fail_names),
            ("errorNames", &error_names),
            ("skipNames", &skip_names),
        ] {
            for name in entries {
                if let Some(first) = seen.insert(name.as_str(), list) {
                    return Err(MarkerError::DuplicateTestName {
                        name: name.clone(),
                        first,
                        second: list,
                    });
                }
            }
        }

        let custom = match obj.get("custom") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(invalid("custom", "expected an array")),
        };

        let output_custom = match obj.get("outputCustom") {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(_) => return Err(invalid("outputCustom", "expected an object")),
        };

        let attachments = match obj.get("attachments") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| invalid("attachments", &e.to_string()))?,
        };

        let postback_on_complete = match obj.get("postbackOnComplete") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => return Err(invalid("postbackOnComplete", "expected a boolean")),
        };

        Ok(SandboxReport {
            grade: GradeReport {
                score_overall,
                score_test,
                score_cover,
                pass_names,
                fail_names,
                error_names,
                skip_names,
                custom,
            },
            feedback: optional_string(obj, "feedback")?,
            postback_on_complete,
            attachments,
            output_custom,
            script_version: optional_string(obj, "scriptVersion")?,
            suite_version: optional_string(obj, "suiteVersion")?,
        })
    }
}

fn invalid(field: &str, reason: &str) -> MarkerError {
    MarkerError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn score(obj: &Map<String, Value>, field: &str) -> Result<f64, MarkerError> {
    let value = obj
        .get(field)
        .ok_or_else(|| MarkerError::MissingField(field.to_string()))?;
    let n = value
        .as_f64()
        .ok_or_else(|| invalid(field, "expected a number"))?;
    if !n.is_finite() || n < 0.0 {
        return Err(invalid(field, "must be a non-negative number"));
    }
    Ok(n)
}

fn names(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, MarkerError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(String::from)
                    .ok_or_else(|| invalid(field, "expected an array of strings"))
            })
            .collect(),
        Some(_) => Err(invalid(field, "expected an array of strings")),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, MarkerError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn parse(value: Value) -> Result<SandboxReport, MarkerError> {
        JsonReportParser.parse(&value)
    }

    #[test]
    fn parses_full_report() {
        let report = parse(json!({
            "scoreOverall": 50,
            "scoreTest": 62.5,
            "scoreCover": 40,
            "passNames": ["a", "b"],
            "failNames": ["c"],
            "errorNames": [],
            "skipNames": ["d"],
            "custom": [{ "k": 1 }],
            "outputCustom": { "coverage": { "lines": 81 } },
            "feedback": "Test Feedback",
            "postbackOnComplete": true,
            "attachments": [{ "name": "log", "data": "x", "content_type": "text/plain" }],
            "scriptVersion": "1.0"
        }))
        .unwrap();

        assert_eq!(report.grade.score_overall, 50.0);
        assert_eq!(report.grade.score_test, 62.5);
        assert_eq!(report.grade.pass_names, vec!["a", "b"]);
        assert_eq!(report.grade.skip_names, vec!["d"]);
        assert_eq!(report.grade.custom.len(), 1);
        assert_eq!(report.output_custom, Some(json!({ "coverage": { "lines": 81 } })));
        assert_eq!(report.feedback.as_deref(), Some("Test Feedback"));
        assert_eq!(report.postback_on_complete, Some(true));
        assert_eq!(report.attachments[0].content_type, "text/plain");
        assert_eq!(report.script_version.as_deref(), Some("1.0"));
        assert_eq!(report.suite_version, None);
    }

    #[test]
    fn name_lists_default_to_empty() {
        let report = parse(json!({ "scoreOverall": 0, "scoreTest": 0, "scoreCover": 0 })).unwrap();
        assert!(report.grade.pass_names.is_empty());
        assert!(report.grade.fail_names.is_empty());
        assert!(report.attachments.is_empty());
        assert!(report.feedback.is_none());
    }

    #[test]
    fn missing_score_is_reported() {
        let err = parse(json!({ "scoreOverall": 1, "scoreTest": 1 })).unwrap_err();
        assert!(matches!(err, MarkerError::MissingField(f) if f == "scoreCover"));
    }

    #[test]
    fn negative_or_non_numeric_scores_are_rejected() {
        let err = parse(json!({ "scoreOverall": -1, "scoreTest": 0, "scoreCover": 0 })).unwrap_err();
        assert!(matches!(err, MarkerError::InvalidField { field, .. } if field == "scoreOverall"));

        let err = parse(json!({ "scoreOverall": "50", "scoreTest": 0, "scoreCover": 0 })).unwrap_err();
        assert!(matches!(err, MarkerError::InvalidField { field, .. } if field == "scoreOverall"));
    }

    #[test]
    fn test_names_must_partition() {
        let err = parse(json!({
            "scoreOverall": 1, "scoreTest": 1, "scoreCover": 1,
            "passNames": ["t1"], "errorNames": ["t1"]
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "test 't1' is listed in both passNames and errorNames");

        let err = parse(json!({
            "scoreOverall": 1, "scoreTest": 1, "scoreCover": 1,
            "failNames": ["t2", "t2"]
        }))
        .unwrap_err();
        assert!(matches!(err, MarkerError::DuplicateTestName { first: "failNames", second: "failNames", .. }));
    }

    #[test]
    fn output_custom_must_be_an_object() {
        let err = parse(json!({
            "scoreOverall": 1, "scoreTest": 1, "scoreCover": 1,
            "outputCustom": [1]
        }))
        .unwrap_err();
        assert!(matches!(err, MarkerError::InvalidField { field, .. } if field == "outputCustom"));

        let report = parse(json!({ "scoreOverall": 1, "scoreTest": 1, "scoreCover": 1 })).unwrap();
        assert_eq!(report.output_custom, None);
    }

    #[test]
    fn non_object_is_invalid_json() {
        assert!(matches!(parse(json!([1, 2])), Err(MarkerError::InvalidJson(_))));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"scoreOverall": 50, "scoreTest": 50, "scoreCover": 50}}"#).unwrap();
        let report = JsonReportParser.read(file.path()).unwrap();
        assert_eq!(report.grade.score_overall, 50.0);

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "{{ not json").unwrap();
        assert!(matches!(JsonReportParser.read(broken.path()), Err(MarkerError::InvalidJson(_))));

        let missing = JsonReportParser.read(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(MarkerError::Io(_))));
    }
}
