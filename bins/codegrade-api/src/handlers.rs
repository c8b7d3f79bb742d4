// HTTP route handlers for the Codegrade API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use codegrade_common::redis;
use codegrade_common::types::{
    DisplayTestCaseResult, Language, RunRequest, Submission, SubmissionRequest,
};
use codegrade_engine::evaluator::display_results;
use codegrade_engine::GradeError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Test-taker view of a stored submission. Hidden cases are redacted.
#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub submission_id: Uuid,
    pub attempt_id: String,
    pub question_id: String,
    pub language: Language,
    pub code: String,
    pub final_score: f64,
    pub max_possible_score: f64,
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub total_execution_time_ms: u64,
    pub max_execution_time_ms: u64,
    pub test_case_results: Vec<DisplayTestCaseResult>,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
}

impl From<&Submission> for SubmissionView {
    fn from(submission: &Submission) -> Self {
        let evaluation = &submission.result;
        Self {
            submission_id: submission.id,
            attempt_id: submission.attempt_id.clone(),
            question_id: submission.question_id.clone(),
            language: submission.language,
            code: submission.code.clone(),
            final_score: evaluation.final_score,
            max_possible_score: evaluation.max_possible_score,
            passed_count: evaluation.passed_count,
            failed_count: evaluation.failed_count,
            total_count: evaluation.total_count,
            total_execution_time_ms: evaluation.total_execution_time_ms,
            max_execution_time_ms: evaluation.max_execution_time_ms,
            // Inputs are not kept with the submission
            test_case_results: display_results(&evaluation.test_case_results, &[]),
            submitted_at: submission.submitted_at,
            evaluated_at: evaluation.evaluated_at,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Grader errors are all caused by the request itself
fn grade_error_response(e: GradeError) -> Response {
    error_response(StatusCode::BAD_REQUEST, e.to_string())
}

/// POST /run - Check code against one sample input. Nothing is stored.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Response {
    match state.grader.run_single(&payload).await {
        Ok(response) => {
            metrics::observe_execution(response.result.status, response.result.execution_time_ms);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            warn!(language = %payload.language, error = %e, "Run request rejected");
            grade_error_response(e)
        }
    }
}

/// POST /submit - Grade a submission against all of its test cases
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmissionRequest>,
) -> Response {
    let response = match state.grader.grade_submission(&payload).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                attempt_id = %payload.attempt_id,
                question_id = %payload.question_id,
                error = %e,
                "Submission rejected"
            );
            return grade_error_response(e);
        }
    };

    let evaluation = &response.evaluation;
    metrics::observe_submission(metrics::submission_outcome(
        evaluation.passed_count,
        evaluation.total_count,
        response.rejected,
    ));
    if !response.rejected {
        metrics::observe_test_cases(&evaluation.test_case_results);
    }

    if let Some(mut conn) = state.redis.clone() {
        if let Some(submission) = state.grader.store().get(&response.submission_id) {
            // Mirror failures never fail the request
            if let Err(e) =
                redis::store_submission(&mut conn, &submission, state.result_ttl_secs).await
            {
                error!(submission_id = %submission.id, error = %e, "Failed to mirror submission");
            }
        }
    }

    info!(
        submission_id = %response.submission_id,
        score = evaluation.final_score,
        "Submission accepted"
    );
    (StatusCode::CREATED, Json(response)).into_response()
}

/// GET /submissions/:submission_id
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Response {
    let id = match Uuid::parse_str(&submission_id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format"),
    };

    match state.grader.store().get(&id) {
        Some(submission) => (StatusCode::OK, Json(SubmissionView::from(submission.as_ref()))).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Submission {} not found", id)),
    }
}

/// GET /attempts/:attempt_id/questions/:question_id - Latest submission
pub async fn get_latest_submission(
    State(state): State<Arc<AppState>>,
    Path((attempt_id, question_id)): Path<(String, String)>,
) -> Response {
    if let Some(submission) = state.grader.store().latest(&attempt_id, &question_id) {
        return (StatusCode::OK, Json(SubmissionView::from(submission.as_ref()))).into_response();
    }

    // Fall back to the mirror, which outlives process restarts
    if let Some(mut conn) = state.redis.clone() {
        match redis::get_latest(&mut conn, &attempt_id, &question_id).await {
            Ok(Some(submission)) => {
                return (StatusCode::OK, Json(SubmissionView::from(&submission))).into_response();
            }
            Ok(None) => {}
            Err(e) => {
                error!(attempt_id = %attempt_id, question_id = %question_id, error = %e, "Failed to read mirror");
            }
        }
    }

    error_response(
        StatusCode::NOT_FOUND,
        format!("No submission for attempt {} question {}", attempt_id, question_id),
    )
}

/// GET /attempts/:attempt_id/submissions - Every submission, oldest first
pub async fn list_attempt_submissions(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Response {
    let views: Vec<SubmissionView> = state
        .grader
        .store()
        .for_attempt(&attempt_id)
        .iter()
        .map(|s| SubmissionView::from(s.as_ref()))
        .collect();
    (StatusCode::OK, Json(views)).into_response()
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn render_metrics() -> Response {
    match metrics::render() {
        Ok((body, content_type)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use codegrade_common::config::SandboxConfig;
    use codegrade_engine::{Grader, SubmissionStore};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> axum::Router {
        let state = Arc::new(AppState {
            grader: Grader::new(SandboxConfig::default(), Arc::new(SubmissionStore::new())),
            redis: None,
            result_ttl_secs: 60,
        });
        crate::app(state)
    }

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn submission(attempt: &str, question: &str, expected: &str) -> Value {
        json!({
            "attempt_id": attempt,
            "question_id": question,
            "code": "s = input()\nprint(s)",
            "language": "python",
            "test_cases": [
                {"id": 1, "input": "hi", "expected_output": "hi"},
                {"id": 2, "input": "secret", "expected_output": expected, "is_hidden": true}
            ],
            "max_points": 10.0
        })
    }

    #[tokio::test]
    async fn test_run_endpoint() {
        let app = test_app();
        let (status, body) = send(
            &app,
            post_json(
                "/run",
                json!({"code": "n = int(input())\nprint(n * 2)", "language": "python", "input": "21", "expected_output": "42"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["passed"], true);
        assert_eq!(body["result"]["output"], "42");
        assert_eq!(body["result"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_unsupported_language_is_bad_request() {
        let app = test_app();
        let (status, body) = send(
            &app,
            post_json(
                "/run",
                json!({"code": "print(1)", "language": "cobol", "input": "", "expected_output": "1"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported language: cobol");
    }

    #[tokio::test]
    async fn test_submit_then_lookup_redacts_hidden_cases() {
        let app = test_app();
        let (status, body) = send(&app, post_json("/submit", submission("a1", "q1", "nope"))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["evaluation"]["final_score"], 5.0);
        assert_eq!(body["message"], "Hidden test case 2 failed.");
        assert_eq!(body["rejected"], false);
        let id = body["submission_id"].as_str().unwrap().to_string();

        let (status, view) = send(&app, get(&format!("/submissions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        let cases = view["test_case_results"].as_array().unwrap();
        assert_eq!(cases[0]["actual_output"], "hi");
        assert_eq!(cases[1]["hidden"], true);
        assert!(cases[1].get("actual_output").is_none());
        assert!(cases[1].get("expected_output").is_none());
    }

    #[tokio::test]
    async fn test_latest_and_attempt_listing() {
        let app = test_app();
        send(&app, post_json("/submit", submission("a1", "q1", "nope"))).await;
        let (_, second) = send(&app, post_json("/submit", submission("a1", "q1", "secret"))).await;
        send(&app, post_json("/submit", submission("a1", "q2", "secret"))).await;

        let (status, latest) = send(&app, get("/attempts/a1/questions/q1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["submission_id"], second["submission_id"]);
        assert_eq!(latest["final_score"], 10.0);

        let (status, list) = send(&app, get("/attempts/a1/submissions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let app = test_app();
        let (status, _) = send(&app, get("/submissions/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, get(&format!("/submissions/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get("/attempts/none/questions/q1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_code_is_still_recorded() {
        let app = test_app();
        let mut payload = submission("a9", "q1", "secret");
        payload["code"] = json!("import os\nprint(1)");
        let (status, body) = send(&app, post_json("/submit", payload)).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["evaluation"]["final_score"], 0.0);
        assert_eq!(body["rejected"], true);
        assert_eq!(body["message"], "Validation failed: Forbidden construct detected: 'import os'");

        let (status, _) = send(&app, get("/attempts/a9/questions/q1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = test_app();
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        metrics::init();
        let response = app.clone().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
