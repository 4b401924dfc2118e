//! Types shared by every crate in the grader workspace.
//!
//! - [`types`] holds the wire contracts exchanged with the course platform
//!   (push/comment events, container input and output, grade reports).
//! - [`task_id`] holds the validated task identifier used as a directory name.
//! - [`logger`] installs the process-wide `tracing` subscriber.

pub mod logger;
pub mod task_id;
pub mod types;

use validator::ValidationErrors;

/// Flattens `validator` errors into a single human-readable line.
///
/// Field errors without a custom message fall back to `"<field> is invalid"`.
/// Nested struct errors are reported with a dotted path.
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_messages(errors, "", &mut messages);
    messages.sort();
    messages.join("; ")
}

fn collect_messages(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    match &e.message {
                        Some(m) => out.push(m.to_string()),
                        None => out.push(format!("{path} is invalid")),
                    }
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_messages(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    collect_messages(inner, &format!("{path}[{idx}]"), out);
                }
            }
        }
    }
}
