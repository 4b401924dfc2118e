use crate::response::{ApiResponse, Empty};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use code_runner::GradeError;
use common::task_id::TaskId;
use common::types::ContainerInput;

/// PUT /task/grade/{task_id}
///
/// Grades the commit described by the `ContainerInput` body and answers with
/// the `ContainerOutput` once the sandbox run has finished.
///
/// ### Responses
/// - `200 OK` with the output, whatever the graded program's outcome
///   (`SUCCESS`, `FAIL`, `TIMEOUT`, `CONSOLEOVERFLOW`)
/// - `400 Bad Request` for malformed input and infrastructure failures
/// - `409 Conflict` when the task id is already running
pub async fn grade_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    payload: Result<Json<ContainerInput>, JsonRejection>,
) -> Response {
    let task_id = match TaskId::parse(&task_id) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let Json(input) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.manager.grade(task_id, input).await {
        Ok(output) => {
            let message = format!("Task graded: {}", output.state);
            (StatusCode::OK, Json(ApiResponse::success(output, message))).into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

pub(crate) fn status_for(err: &GradeError) -> StatusCode {
    match err {
        GradeError::TaskBusy(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<Empty>::error(message))).into_response()
}
