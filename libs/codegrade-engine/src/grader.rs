/// Grading Engine - High-Level Orchestration
///
/// **Responsibility:**
/// Drive Validator → Sandbox → Evaluator for every test case and persist
/// the outcome.
///
/// **Architecture:**
/// 1. Resolve the language tag (unsupported tags fail the whole call)
/// 2. Validate once; an invalid program short-circuits with a zero score
/// 3. Run each test case in author order, each in a fresh sandbox execution
/// 4. Score with the evaluator and record a new submission in the store
///
/// This module is the glue layer - it knows nothing about:
/// - How guest code executes (sandbox/interpreter's job)
/// - How outputs are compared or scored (evaluator's job)
use crate::error::GradeError;
use crate::evaluator::{self, Tally};
use crate::sandbox::{InterpreterRunner, Sandbox, ScriptRunner};
use crate::store::SubmissionStore;
use crate::validator::validate_code;
use chrono::Utc;
use codegrade_common::config::SandboxConfig;
use codegrade_common::types::{
    EvaluationResult, ExecutionResult, ExecutionStatus, Language, RunRequest, RunResponse,
    Submission, SubmissionRequest, SubmissionResponse, TestCase, TestCaseResult,
    ValidationSummary,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Grader {
    default_config: SandboxConfig,
    runner: Arc<dyn ScriptRunner>,
    store: Arc<SubmissionStore>,
}

/// Per-case results plus the submission-level summary
struct Graded {
    results: Vec<TestCaseResult>,
    summary: ValidationSummary,
    message: String,
    total_execution_time_ms: u64,
    max_execution_time_ms: u64,
    rejected: bool,
}

fn resolve_language(tag: &str) -> Result<Language, GradeError> {
    Language::from_tag(tag).ok_or_else(|| GradeError::UnsupportedLanguage(tag.to_string()))
}

impl Grader {
    pub fn new(default_config: SandboxConfig, store: Arc<SubmissionStore>) -> Self {
        Self::with_runner(default_config, store, Arc::new(InterpreterRunner))
    }

    /// Grader with a custom execution backend
    pub fn with_runner(
        default_config: SandboxConfig,
        store: Arc<SubmissionStore>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            default_config,
            runner,
            store,
        }
    }

    pub fn store(&self) -> &Arc<SubmissionStore> {
        &self.store
    }

    pub fn default_config(&self) -> &SandboxConfig {
        &self.default_config
    }

    fn sandbox(&self, config: Option<&SandboxConfig>) -> Sandbox {
        let config = config.unwrap_or(&self.default_config).clone();
        Sandbox::with_runner(config, Arc::clone(&self.runner))
    }

    /// Exploratory check of one sample input. Nothing is persisted.
    #[tracing::instrument(skip(self, request), fields(language = %request.language))]
    pub async fn run_single(&self, request: &RunRequest) -> Result<RunResponse, GradeError> {
        resolve_language(&request.language)?;
        let sandbox = self.sandbox(request.config.as_ref());

        let validation = validate_code(&request.code, sandbox.config());
        if let Err(GradeError::Validation(reason)) = validation.into_result() {
            warn!(reason = %reason, "Code rejected by validator");
            return Ok(RunResponse {
                result: ExecutionResult::failed(String::new(), reason.clone(), 0),
                passed: false,
                validation: ValidationSummary {
                    passed: false,
                    failed_test_case: Some(1),
                    expected: Some(evaluator::normalize_output(&request.expected_output)),
                    received: None,
                    error: Some(reason),
                    total_tests: 1,
                    passed_count: 0,
                    failed_count: 1,
                },
            });
        }

        let sample = TestCase {
            id: 1,
            input: request.input.clone(),
            expected_output: request.expected_output.clone(),
            is_hidden: false,
        };
        let result = sandbox.execute(&request.code, &sample.input).await;
        let verdict = evaluator::classify(&result, &sample.expected_output);

        let mut tally = Tally::new();
        tally.record(1, &sample, &verdict, &result);

        info!(
            status = %result.status,
            passed = verdict.passed(),
            execution_ms = result.execution_time_ms,
            "Single-case check completed"
        );

        Ok(RunResponse {
            passed: verdict.passed(),
            validation: tally.summary(),
            result,
        })
    }

    /// Grade a full submission and record it as the latest for its
    /// (attempt, question) pair
    #[tracing::instrument(
        skip(self, request),
        fields(
            attempt_id = %request.attempt_id,
            question_id = %request.question_id,
            test_cases = request.test_cases.len()
        )
    )]
    pub async fn grade_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse, GradeError> {
        let language = resolve_language(&request.language)?;
        let submitted_at = Utc::now();
        let sandbox = self.sandbox(request.config.as_ref());
        let max_points = if request.max_points.is_finite() && request.max_points > 0.0 {
            request.max_points
        } else {
            0.0
        };

        let graded = match validate_code(&request.code, sandbox.config()).into_result() {
            Err(GradeError::Validation(reason)) => {
                warn!(reason = %reason, "Submission rejected by validator; no test cases executed");
                validation_failure(&request.test_cases, reason)
            }
            _ => self.run_all(&sandbox, &request.code, &request.test_cases).await,
        };

        let total_count = request.test_cases.len();
        let passed_count = graded.summary.passed_count;
        let final_score = evaluator::calculate_score(passed_count, total_count, max_points);

        let evaluation = EvaluationResult {
            question_id: request.question_id.clone(),
            attempt_id: request.attempt_id.clone(),
            code: request.code.clone(),
            language,
            test_case_results: graded.results,
            passed_count,
            failed_count: graded.summary.failed_count,
            total_count,
            total_execution_time_ms: graded.total_execution_time_ms,
            max_execution_time_ms: graded.max_execution_time_ms,
            final_score,
            max_possible_score: max_points,
            submitted_at,
            evaluated_at: Utc::now(),
        };

        let submission = self.store.record(Submission {
            id: Uuid::new_v4(),
            attempt_id: request.attempt_id.clone(),
            question_id: request.question_id.clone(),
            code: request.code.clone(),
            language,
            result: evaluation,
            submitted_at,
        });

        info!(
            submission_id = %submission.id,
            passed = passed_count,
            total = total_count,
            score = final_score,
            max_score = max_points,
            "Submission graded"
        );

        Ok(SubmissionResponse {
            submission_id: submission.id,
            evaluation: submission.result.clone(),
            validation: graded.summary,
            message: graded.message,
            rejected: graded.rejected,
        })
    }

    async fn run_all(&self, sandbox: &Sandbox, code: &str, test_cases: &[TestCase]) -> Graded {
        let mut tally = Tally::new();
        let mut results = Vec::with_capacity(test_cases.len());

        for (idx, test_case) in test_cases.iter().enumerate() {
            let result = sandbox.execute(code, &test_case.input).await;
            let (verdict, case_result) = evaluator::evaluate_test(test_case, &result);

            debug!(
                test_num = idx + 1,
                test_id = test_case.id,
                status = %result.status,
                passed = case_result.passed,
                execution_ms = result.execution_time_ms,
                "Test result"
            );
            if result.status == ExecutionStatus::Timeout {
                warn!(test_id = test_case.id, "Test case timed out; continuing with remaining cases");
            }

            tally.record(idx + 1, test_case, &verdict, &result);
            results.push(case_result);
        }

        Graded {
            results,
            summary: tally.summary(),
            message: tally.message(),
            total_execution_time_ms: tally.total_execution_time_ms,
            max_execution_time_ms: tally.max_execution_time_ms,
            rejected: false,
        }
    }
}

/// Every case failed with the validation error; nothing executed
fn validation_failure(test_cases: &[TestCase], reason: String) -> Graded {
    let results = test_cases
        .iter()
        .map(|tc| TestCaseResult {
            test_case_id: tc.id,
            passed: false,
            actual_output: String::new(),
            expected_output: if tc.is_hidden {
                String::new()
            } else {
                tc.expected_output.clone()
            },
            execution_time_ms: 0,
            status: ExecutionStatus::Error,
            error: Some(reason.clone()),
            hidden: tc.is_hidden,
        })
        .collect();

    Graded {
        results,
        summary: ValidationSummary {
            passed: false,
            failed_test_case: Some(1),
            expected: None,
            received: None,
            error: Some(reason.clone()),
            total_tests: test_cases.len(),
            passed_count: 0,
            failed_count: test_cases.len(),
        },
        message: GradeError::Validation(reason).to_string(),
        total_execution_time_ms: 0,
        max_execution_time_ms: 0,
        rejected: true,
    }
}
