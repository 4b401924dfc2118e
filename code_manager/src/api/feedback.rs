use crate::api::grade::error_response;
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::types::FeedbackRecord;

/// POST /feedback
///
/// Records that a result was delivered to a user. Later comment requests for
/// the same (user, deliverable, commit) are rejected as already graded.
///
/// - `200 OK` when recorded
/// - `409 Conflict` when the same delivery was recorded before
pub async fn record_feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackRecord>, JsonRejection>,
) -> Response {
    let Json(record) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let user = record.user_name.clone();
    let deliv = record.deliv_id.clone();
    if state.history.record_feedback(record.clone()) {
        tracing::info!(user = %user, deliv_id = %deliv, "Feedback recorded");
        (StatusCode::OK, Json(ApiResponse::success(record, "Feedback recorded"))).into_response()
    } else {
        error_response(StatusCode::CONFLICT, "Feedback was already recorded for this commit")
    }
}
