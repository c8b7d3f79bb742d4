// CLI commands for checking and grading guest programs locally
use anyhow::{bail, Context, Result};
use codegrade_common::config::{SandboxConfig, ServiceConfig};
use codegrade_common::types::{
    DisplayTestCaseResult, RunRequest, SubmissionRequest, SubmissionResponse, TestCase,
    ValidationSummary,
};
use codegrade_engine::evaluator::display_results;
use codegrade_engine::validator::validate_code;
use codegrade_engine::{Grader, SubmissionStore};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Printed by `grade`; hidden cases are redacted
#[derive(Debug, Serialize)]
pub struct GradeReport {
    pub submission_id: String,
    pub final_score: f64,
    pub max_possible_score: f64,
    pub passed_count: usize,
    pub total_count: usize,
    pub validation: ValidationSummary,
    pub test_case_results: Vec<DisplayTestCaseResult>,
    pub message: String,
}

impl GradeReport {
    pub fn new(response: SubmissionResponse, test_cases: &[TestCase]) -> Self {
        let evaluation = &response.evaluation;
        Self {
            submission_id: response.submission_id.to_string(),
            final_score: evaluation.final_score,
            max_possible_score: evaluation.max_possible_score,
            passed_count: evaluation.passed_count,
            total_count: evaluation.total_count,
            test_case_results: display_results(&evaluation.test_case_results, test_cases),
            validation: response.validation,
            message: response.message,
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_sandbox_config(config_path: &Path) -> Result<SandboxConfig> {
    Ok(ServiceConfig::load(config_path)?.sandbox)
}

/// Parse a JSON array of test cases. Ids must be unique.
pub fn parse_test_cases(content: &str) -> Result<Vec<TestCase>> {
    let test_cases: Vec<TestCase> =
        serde_json::from_str(content).context("Test cases must be a JSON array")?;

    let mut seen = HashSet::new();
    for tc in &test_cases {
        if !seen.insert(tc.id) {
            bail!("Duplicate test case id {}", tc.id);
        }
    }
    Ok(test_cases)
}

/// Validate a program without running it
pub fn check(config_path: &Path, code_path: &Path) -> Result<()> {
    let code = read_file(code_path)?;
    let config = load_sandbox_config(config_path)?;

    println!("🔍 Checking {}", code_path.display());
    let validation = validate_code(&code, &config);
    match validation.error {
        Some(reason) if !validation.is_valid => {
            println!("❌ {}", reason);
            bail!("Validation failed: {}", reason);
        }
        _ => {
            println!("✅ Code passed validation");
            Ok(())
        }
    }
}

/// Run against one sample input and print the RunResponse as JSON
pub async fn run(
    config_path: &Path,
    code_path: &Path,
    input_path: Option<&Path>,
    expected_path: Option<&Path>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut config = load_sandbox_config(config_path)?;
    if let Some(timeout_ms) = timeout_ms {
        if timeout_ms == 0 {
            bail!("--timeout-ms must be greater than zero");
        }
        config.timeout_ms = timeout_ms;
    }

    let request = RunRequest {
        code: read_file(code_path)?,
        language: "python".to_string(),
        input: input_path.map(read_file).transpose()?.unwrap_or_default(),
        expected_output: expected_path.map(read_file).transpose()?.unwrap_or_default(),
        config: Some(config.clone()),
    };

    let grader = Grader::new(config, Arc::new(SubmissionStore::new()));
    let response = grader.run_single(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Grade against every test case and print the redacted report
pub async fn grade(
    config_path: &Path,
    code_path: &Path,
    tests_path: &Path,
    max_points: f64,
    attempt_id: &str,
    question_id: &str,
) -> Result<()> {
    if !max_points.is_finite() || max_points < 0.0 {
        bail!("--max-points must be a non-negative number");
    }

    let config = load_sandbox_config(config_path)?;
    let test_cases = parse_test_cases(&read_file(tests_path)?)
        .with_context(|| format!("Invalid test case file {}", tests_path.display()))?;

    let request = SubmissionRequest {
        attempt_id: attempt_id.to_string(),
        question_id: question_id.to_string(),
        code: read_file(code_path)?,
        language: "python".to_string(),
        test_cases,
        max_points,
        config: None,
    };

    let grader = Grader::new(config, Arc::new(SubmissionStore::new()));
    let response = grader.grade_submission(&request).await?;
    let report = GradeReport::new(response, &request.test_cases);

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "\n📊 Score: {} / {} ({}/{} passed)",
        report.final_score, report.max_possible_score, report.passed_count, report.total_count
    );
    eprintln!("{}", report.message);
    Ok(())
}
