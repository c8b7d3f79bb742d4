// Static pre-check for guest code.
// A cheap denylist gate in front of the interpreter; not a security boundary.
use crate::error::GradeError;
use codegrade_common::config::SandboxConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl CodeValidation {
    fn valid() -> Self {
        Self { is_valid: true, error: None }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<(), GradeError> {
        match self.error {
            Some(error) if !self.is_valid => Err(GradeError::Validation(error)),
            _ => Ok(()),
        }
    }
}

/// Check, in order: emptiness, comment-only code, then the denylist.
/// The first denylisted pattern found (baseline entries first) is reported.
pub fn validate_code(code: &str, config: &SandboxConfig) -> CodeValidation {
    if code.trim().is_empty() {
        return CodeValidation::invalid("Code cannot be empty");
    }

    let has_statement = code
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'));
    if !has_statement {
        return CodeValidation::invalid("Code contains only comments");
    }

    let lowered = code.to_lowercase();
    if let Some(pattern) = config
        .merged_patterns()
        .into_iter()
        .find(|pattern| lowered.contains(pattern.as_str()))
    {
        debug!(pattern = %pattern, "Blocked pattern found in code");
        return CodeValidation::invalid(format!("Forbidden construct detected: '{}'", pattern));
    }

    CodeValidation::valid()
}
