use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(handlers::run_code))
        .route("/submit", post(handlers::submit_code))
        .route("/submissions/:submission_id", get(handlers::get_submission))
        .route(
            "/attempts/:attempt_id/questions/:question_id",
            get(handlers::get_latest_submission),
        )
        .route(
            "/attempts/:attempt_id/submissions",
            get(handlers::list_attempt_submissions),
        )
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::render_metrics))
}
