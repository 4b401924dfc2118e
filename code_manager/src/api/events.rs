use crate::api::grade::error_response;
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::format_validation_errors;
use common::types::{CommentEvent, PushEvent};
use serde::Serialize;
use services::admission_service::{AdmissionRejected, AdmittedTask};
use validator::Validate;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
}

/// POST /events/push
///
/// Push events are always admitted. A push whose course names a grading image
/// is queued for grading. Responds with the admitted task descriptor.
pub async fn push_event(
    State(state): State<AppState>,
    payload: Result<Json<PushEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if let Err(errors) = event.validate() {
        return error_response(StatusCode::BAD_REQUEST, format_validation_errors(&errors));
    }

    let task = state.admission.admit_push(&event);
    dispatch(&state, &task);
    (StatusCode::OK, Json(ApiResponse::success(task, "Push admitted"))).into_response()
}

/// POST /events/comment
///
/// ### Responses
/// - `200 OK` with the admitted task; the request is recorded for cooldown
///   and queued for grading when the deliverable has an image
/// - `429 Too Many Requests` when the cooldown has not elapsed
/// - `409 Conflict` when this commit was already graded for the requester
/// - `422 Unprocessable Entity` when no deliverable applies or the bot was not asked
pub async fn comment_event(
    State(state): State<AppState>,
    payload: Result<Json<CommentEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state.admission.admit_comment_and_record(&event, &state.history) {
        Ok(task) => {
            dispatch(&state, &task);
            (StatusCode::OK, Json(ApiResponse::success(task, "Comment admitted"))).into_response()
        }
        Err(rejection) => {
            let status = match rejection {
                AdmissionRejected::TooSoon { .. } => StatusCode::TOO_MANY_REQUESTS,
                AdmissionRejected::AlreadyGraded { .. } => StatusCode::CONFLICT,
                AdmissionRejected::UnresolvedDeliverable | AdmissionRejected::NotRequested => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            };
            let remaining_secs = match &rejection {
                AdmissionRejected::TooSoon { remaining, .. } => {
                    Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
                }
                _ => None,
            };
            let body = ApiResponse {
                success: false,
                data: Rejection {
                    kind: rejection.kind(),
                    remaining_secs,
                },
                message: rejection.reason(),
            };
            (status, Json(body)).into_response()
        }
    }
}

fn dispatch(state: &AppState, task: &AdmittedTask) {
    if let Some(input) = &task.input {
        state.manager.dispatch(task.task_id.clone(), input.clone());
    }
}
