use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::SandboxConfig;

/// Guest languages accepted by the grader.
///
/// Only the indentation-based scripting subset is supported; any other tag
/// is rejected before a single line of guest code is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
}

impl Language {
    /// Resolve a language tag as sent by the session layer
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Some(Language::Python),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
        }
    }
}

/// A single authored test case. Immutable once it reaches the grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Error,
    Timeout,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Error => write!(f, "error"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome of one sandboxed interpreter invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn completed(output: String, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            execution_time_ms,
            status: ExecutionStatus::Completed,
        }
    }

    pub fn failed(output: String, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            execution_time_ms,
            status: ExecutionStatus::Error,
        }
    }

    /// Partial progress made before the timer fired is never reported
    pub fn timed_out(timeout_ms: u64, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(format!("Time limit exceeded ({}ms)", timeout_ms)),
            execution_time_ms,
            status: ExecutionStatus::Timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case_id: u32,
    pub passed: bool,
    pub actual_output: String,
    /// Blank when the test case is hidden
    pub expected_output: String,
    pub execution_time_ms: u64,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// Aggregated result of grading one submission against every test case.
///
/// `passed_count + failed_count == total_count` and
/// `0 <= final_score <= max_possible_score` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub question_id: String,
    pub attempt_id: String,
    pub code: String,
    pub language: Language,
    pub test_case_results: Vec<TestCaseResult>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub total_execution_time_ms: u64,
    pub max_execution_time_ms: u64,
    pub final_score: f64,
    pub max_possible_score: f64,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub attempt_id: String,
    pub question_id: String,
    pub code: String,
    pub language: Language,
    pub result: EvaluationResult,
    pub submitted_at: DateTime<Utc>,
}

/// Summary surfaced to the test-taker. Only the first failing case is
/// described in detail.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub passed: bool,
    /// 1-based position of the first failing test case
    pub failed_test_case: Option<usize>,
    pub expected: Option<String>,
    pub received: Option<String>,
    pub error: Option<String>,
    pub total_tests: usize,
    pub passed_count: usize,
    pub failed_count: usize,
}

/// Exploratory "run against one example" request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub config: Option<SandboxConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub result: ExecutionResult,
    pub passed: bool,
    pub validation: ValidationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub attempt_id: String,
    pub question_id: String,
    pub code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
    pub max_points: f64,
    #[serde(default)]
    pub config: Option<SandboxConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub submission_id: Uuid,
    pub evaluation: EvaluationResult,
    pub validation: ValidationSummary,
    pub message: String,
    /// The validator refused the code and no test case was executed
    #[serde(default)]
    pub rejected: bool,
}

/// Test-taker facing projection of a [`TestCaseResult`].
///
/// Hidden cases expose only pass/fail, timing and error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayTestCaseResult {
    pub test_case_id: u32,
    pub passed: bool,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    pub execution_time_ms: u64,
    pub status: ExecutionStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tags() {
        assert_eq!(Language::from_tag("python"), Some(Language::Python));
        assert_eq!(Language::from_tag(" Python3 "), Some(Language::Python));
        assert_eq!(Language::from_tag("py"), Some(Language::Python));
        assert_eq!(Language::from_tag("java"), None);
        assert_eq!(Language::from_tag(""), None);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&ExecutionStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(ExecutionStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_hidden_flag_defaults_to_visible() {
        let tc: TestCase =
            serde_json::from_str(r#"{"id": 1, "input": "4", "expected_output": "even"}"#).unwrap();
        assert!(!tc.is_hidden);
    }

    #[test]
    fn test_timed_out_discards_output() {
        let result = ExecutionResult::timed_out(1000, 1002);
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.error.as_deref(), Some("Time limit exceeded (1000ms)"));
    }
}
