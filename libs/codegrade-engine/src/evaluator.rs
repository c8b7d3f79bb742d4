/// Test Evaluator - Output Comparison and Scoring
///
/// **Core Responsibility:**
/// Judge raw execution results against expected outputs and aggregate scores.
///
/// **Critical Properties:**
/// - Knows nothing about how code executes
/// - Knows nothing about where results are stored
/// - Pure functions: (execution results, test cases) → verdicts and scores
///
/// **Normalization Rules (applied identically to expected and actual):**
/// - Line endings: `\r\n` and `\r` become `\n`
/// - Leading/trailing whitespace of the whole text: trimmed
/// - Trailing whitespace of each line: trimmed
/// - Case sensitivity: YES (exact match required)
/// - Partial credit / fuzzy matching: NO
///
/// **Scoring Rules:**
/// - score = passed × (max_points / total), rounded half away from zero to 2 decimals
/// - full marks only when every case passed
use codegrade_common::types::{
    DisplayTestCaseResult, ExecutionResult, ExecutionStatus, TestCase, TestCaseResult,
    ValidationSummary,
};

/// Normalize output text for comparison
pub fn normalize_output(output: &str) -> String {
    let unified = output.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .trim()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strict equality of normalized texts
pub fn compare_output(expected: &str, actual: &str) -> bool {
    normalize_output(expected) == normalize_output(actual)
}

/// Classification of one execution against its expected output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseVerdict {
    Passed,
    ExecutionFailed(String),
    TimedOut(String),
    EmptyOutput,
    Mismatch,
}

impl CaseVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, CaseVerdict::Passed)
    }

    /// Error text recorded on a failing case
    pub fn error(&self) -> Option<String> {
        match self {
            CaseVerdict::Passed => None,
            CaseVerdict::ExecutionFailed(e) | CaseVerdict::TimedOut(e) => Some(e.clone()),
            CaseVerdict::EmptyOutput => Some("No output produced".to_string()),
            CaseVerdict::Mismatch => Some("Output mismatch".to_string()),
        }
    }
}

/// Classify an execution result.
///
/// Priority: timeout, then interpreter fault, then empty output when output
/// was expected, then comparison.
pub fn classify(result: &ExecutionResult, expected_output: &str) -> CaseVerdict {
    match result.status {
        ExecutionStatus::Timeout => CaseVerdict::TimedOut(
            result
                .error
                .clone()
                .unwrap_or_else(|| "Time limit exceeded".to_string()),
        ),
        ExecutionStatus::Error => CaseVerdict::ExecutionFailed(
            result
                .error
                .clone()
                .unwrap_or_else(|| "Execution failed".to_string()),
        ),
        ExecutionStatus::Completed => {
            let actual = normalize_output(&result.output);
            let expected = normalize_output(expected_output);
            if actual.is_empty() && !expected.is_empty() {
                CaseVerdict::EmptyOutput
            } else if actual == expected {
                CaseVerdict::Passed
            } else {
                CaseVerdict::Mismatch
            }
        }
    }
}

/// Build the per-case record. Hidden cases never carry their expected output.
pub fn evaluate_test(test_case: &TestCase, result: &ExecutionResult) -> (CaseVerdict, TestCaseResult) {
    let verdict = classify(result, &test_case.expected_output);
    let case_result = TestCaseResult {
        test_case_id: test_case.id,
        passed: verdict.passed(),
        actual_output: result.output.clone(),
        expected_output: if test_case.is_hidden {
            String::new()
        } else {
            test_case.expected_output.clone()
        },
        execution_time_ms: result.execution_time_ms,
        status: result.status,
        error: verdict.error(),
        hidden: test_case.is_hidden,
    };
    (verdict, case_result)
}

/// Score for `passed` of `total` cases on a `max_points` question
pub fn calculate_score(passed: usize, total: usize, max_points: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    if passed >= total {
        return max_points;
    }
    let raw = passed as f64 * (max_points / total as f64);
    ((raw * 100.0).round() / 100.0).clamp(0.0, max_points)
}

#[derive(Debug, Clone, PartialEq)]
struct FirstFailure {
    position: usize,
    expected: String,
    received: String,
    error: Option<String>,
    hidden: bool,
}

/// Running totals over a submission's test cases.
///
/// Only the first failing case keeps its details; later failures are counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub total_execution_time_ms: u64,
    pub max_execution_time_ms: u64,
    first_failure: Option<FirstFailure>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the case at 1-based `position`
    pub fn record(&mut self, position: usize, test_case: &TestCase, verdict: &CaseVerdict, result: &ExecutionResult) {
        self.total_execution_time_ms += result.execution_time_ms;
        self.max_execution_time_ms = self.max_execution_time_ms.max(result.execution_time_ms);

        if verdict.passed() {
            self.passed += 1;
            return;
        }

        self.failed += 1;
        if self.first_failure.is_none() {
            self.first_failure = Some(FirstFailure {
                position,
                expected: normalize_output(&test_case.expected_output),
                received: normalize_output(&result.output),
                error: verdict.error(),
                hidden: test_case.is_hidden,
            });
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }

    pub fn summary(&self) -> ValidationSummary {
        let first = self.first_failure.as_ref();
        let visible = first.filter(|f| !f.hidden);
        ValidationSummary {
            passed: self.all_passed(),
            failed_test_case: first.map(|f| f.position),
            expected: visible.map(|f| f.expected.clone()),
            received: visible.map(|f| f.received.clone()),
            error: first.and_then(|f| f.error.clone()),
            total_tests: self.total(),
            passed_count: self.passed,
            failed_count: self.failed,
        }
    }

    /// Short human-readable outcome
    pub fn message(&self) -> String {
        if self.total() == 0 {
            return "No test cases to evaluate".to_string();
        }
        match &self.first_failure {
            None => format!("🎉 All {} test cases passed!", self.total()),
            Some(f) if f.hidden => format!("Hidden test case {} failed.", f.position),
            Some(f) => format!(
                "Test case {} failed. Expected: \"{}\", Received: \"{}\"",
                f.position, f.expected, f.received
            ),
        }
    }
}

/// Redacted projection for the test-taker. Inputs come from `test_cases`
/// when available; hidden cases expose only pass/fail, timing and error.
pub fn display_results(results: &[TestCaseResult], test_cases: &[TestCase]) -> Vec<DisplayTestCaseResult> {
    results
        .iter()
        .map(|r| {
            let test_case = test_cases.iter().find(|tc| tc.id == r.test_case_id);
            let hidden = r.hidden || test_case.is_some_and(|tc| tc.is_hidden);
            DisplayTestCaseResult {
                test_case_id: r.test_case_id,
                passed: r.passed,
                hidden,
                input: test_case.filter(|_| !hidden).map(|tc| tc.input.clone()),
                expected_output: (!hidden).then(|| r.expected_output.clone()),
                actual_output: (!hidden).then(|| r.actual_output.clone()),
                execution_time_ms: r.execution_time_ms,
                status: r.status,
                error: r.error.clone(),
            }
        })
        .collect()
}
