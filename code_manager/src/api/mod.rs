//! HTTP routes of the grading service.
//!
//! - `GET /health`, `GET /stats`
//! - `PUT /task/grade/{task_id}` → grade one commit synchronously
//! - `POST /events/push`, `POST /events/comment` → admission decisions
//! - `POST /feedback` → record a delivered result
//! - anything else is served read-only from the persist directory
//!
//! Every response allows any origin.

use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod events;
pub mod feedback;
pub mod grade;
pub mod health;

pub fn routes(state: AppState) -> Router {
    let results = ServeDir::new(&state.config.persist_dir);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/stats", get(health::stats))
        .route("/task/grade/{task_id}", put(grade::grade_task))
        .route("/events/push", post(events::push_event))
        .route("/events/comment", post(events::comment_event))
        .route("/feedback", post(feedback::record_feedback))
        .fallback_service(results)
        .layer(cors)
        .with_state(state)
}
