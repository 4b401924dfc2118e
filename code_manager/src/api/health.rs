use crate::manager::queue::QueueStats;
use crate::response::ApiResponse;
use crate::state::AppState;
use axum::{Json, extract::State};

/// GET /health
///
/// ```json
/// { "success": true, "data": "OK", "message": "Health check passed" }
/// ```
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK", "Health check passed"))
}

/// GET /stats
///
/// Snapshot of the execution queue: `{ running, waiting, max_concurrent }`.
pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse<QueueStats>> {
    Json(ApiResponse::success(state.manager.stats(), "Queue statistics"))
}
