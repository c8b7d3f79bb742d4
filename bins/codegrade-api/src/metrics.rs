// Prometheus metrics for the grading service
use codegrade_common::types::{ExecutionStatus, TestCaseResult};
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("codegrade_submissions_total", "Graded submissions by outcome."),
        &["outcome"]
    )
    .expect("create codegrade_submissions_total");
    pub static ref TEST_CASES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("codegrade_test_cases_total", "Executed test cases by status."),
        &["status"]
    )
    .expect("create codegrade_test_cases_total");
    pub static ref EXECUTION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "codegrade_execution_seconds",
            "Wall-clock time of a single guest execution in seconds."
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .expect("create codegrade_execution_seconds");
}

/// Register every collector once at startup
pub fn init() {
    let _ = REGISTRY.register(Box::new(SUBMISSIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TEST_CASES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EXECUTION_SECONDS.clone()));
}

/// `passed`, `partial`, `failed` or `rejected` (validator refused the code)
pub fn submission_outcome(passed: usize, total: usize, rejected: bool) -> &'static str {
    if rejected {
        "rejected"
    } else if total > 0 && passed == total {
        "passed"
    } else if passed > 0 {
        "partial"
    } else {
        "failed"
    }
}

pub fn observe_submission(outcome: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_execution(status: ExecutionStatus, execution_time_ms: u64) {
    TEST_CASES_TOTAL
        .with_label_values(&[status.to_string().as_str()])
        .inc();
    EXECUTION_SECONDS.observe(execution_time_ms as f64 / 1000.0);
}

pub fn observe_test_cases(results: &[TestCaseResult]) {
    for result in results {
        observe_execution(result.status, result.execution_time_ms);
    }
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_outcome() {
        assert_eq!(submission_outcome(3, 3, false), "passed");
        assert_eq!(submission_outcome(1, 3, false), "partial");
        assert_eq!(submission_outcome(0, 3, false), "failed");
        assert_eq!(submission_outcome(0, 0, false), "failed");
        assert_eq!(submission_outcome(0, 3, true), "rejected");
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        init();
        observe_submission("passed");
        observe_execution(ExecutionStatus::Timeout, 1500);

        let (body, content_type) = render().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("codegrade_submissions_total{outcome=\"passed\"}"));
        assert!(text.contains("codegrade_test_cases_total{status=\"timeout\"}"));
        assert!(text.contains("codegrade_execution_seconds_bucket"));
    }
}
