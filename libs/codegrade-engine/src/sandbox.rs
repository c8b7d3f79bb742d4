/// Sandbox Controller - one guarded interpreter invocation
///
/// **Responsibility:**
/// Run a single guest program against a single input under a wall-clock
/// limit and an output cap.
///
/// **Execution Rules:**
/// 1. Each call builds a fresh runner invocation; nothing is shared between calls
/// 2. The runner executes on the blocking pool, raced against `tokio::time::timeout`
/// 3. When the timer wins, the cancel token is tripped and the run is abandoned;
///    the interpreter checks the token before every statement and stops itself
/// 4. A result produced after the timeout is dropped with its join handle and
///    can never be reported
/// 5. Output longer than the configured cap is truncated with a marker
use crate::interpreter::{Interpreter, RunOutcome};
use codegrade_common::config::SandboxConfig;
use codegrade_common::types::ExecutionResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Guardrails applied before any execution
pub const MAX_SOURCE_CODE_BYTES: usize = 64 * 1024;
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

/// Limits enforced inside the interpreter, before anything is allocated
pub const MAX_VALUE_BYTES: usize = 1024 * 1024;
pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

pub const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Shared flag used to stop an abandoned run
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution backend seam. Implementations must honour `cancel` promptly.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, code: &str, input: &str, cancel: &CancelToken) -> RunOutcome;
}

/// Production runner: a fresh [`Interpreter`] per call
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterRunner;

impl ScriptRunner for InterpreterRunner {
    fn run(&self, code: &str, input: &str, cancel: &CancelToken) -> RunOutcome {
        Interpreter::with_cancel(input, cancel.clone()).execute(code)
    }
}

#[derive(Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    runner: Arc<dyn ScriptRunner>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_runner(config, Arc::new(InterpreterRunner))
    }

    pub fn with_runner(config: SandboxConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute once under the configured timeout and output cap
    #[tracing::instrument(skip(self, code, input), fields(timeout_ms = self.config.timeout_ms))]
    pub async fn execute(&self, code: &str, input: &str) -> ExecutionResult {
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return ExecutionResult::failed(
                String::new(),
                format!("Source code exceeds maximum size of {} bytes", MAX_SOURCE_CODE_BYTES),
                0,
            );
        }
        if input.len() > MAX_INPUT_BYTES {
            return ExecutionResult::failed(
                String::new(),
                format!("Input exceeds maximum size of {} bytes", MAX_INPUT_BYTES),
                0,
            );
        }

        let cancel = CancelToken::new();
        let runner = Arc::clone(&self.runner);
        let token = cancel.clone();
        let code = code.to_string();
        let input = input.to_string();

        let start = Instant::now();
        let handle = tokio::task::spawn_blocking(move || runner.run(&code, &input, &token));
        let timeout = Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(outcome)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let output = truncate_output(outcome.output, self.config.max_output_length);
                debug!(
                    exit_code = outcome.exit_code,
                    execution_ms = elapsed_ms,
                    output_len = output.len(),
                    "Execution finished"
                );
                match outcome.error {
                    None if outcome.exit_code == 0 => ExecutionResult::completed(output, elapsed_ms),
                    error => ExecutionResult::failed(
                        output,
                        error.unwrap_or_else(|| format!("Exited with code {}", outcome.exit_code)),
                        elapsed_ms,
                    ),
                }
            }
            Ok(Err(join_error)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                error!(error = %join_error, "Interpreter task failed");
                ExecutionResult::failed(
                    String::new(),
                    "Execution aborted: internal interpreter failure",
                    elapsed_ms,
                )
            }
            Err(_) => {
                cancel.cancel();
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(
                    timeout_ms = self.config.timeout_ms,
                    execution_ms = elapsed_ms,
                    "Execution timed out; run cancelled"
                );
                ExecutionResult::timed_out(self.config.timeout_ms, elapsed_ms)
            }
        }
    }
}

/// Cap output at `max_chars` characters, appending [`TRUNCATION_MARKER`]
pub fn truncate_output(output: String, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut truncated = output[..cut].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegrade_common::types::ExecutionStatus;

    /// Never finishes on its own; records when it observed cancellation
    struct SpinRunner {
        stopped: Arc<AtomicBool>,
    }

    impl ScriptRunner for SpinRunner {
        fn run(&self, _code: &str, _input: &str, cancel: &CancelToken) -> RunOutcome {
            while !cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.stopped.store(true, Ordering::SeqCst);
            RunOutcome {
                output: "late output".to_string(),
                error: None,
                exit_code: 0,
            }
        }
    }

    struct PanicRunner;

    impl ScriptRunner for PanicRunner {
        fn run(&self, _code: &str, _input: &str, _cancel: &CancelToken) -> RunOutcome {
            panic!("interpreter bug");
        }
    }

    fn config(timeout_ms: u64, max_output_length: usize) -> SandboxConfig {
        SandboxConfig {
            timeout_ms,
            max_output_length,
            blocked_patterns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_completed_execution() {
        let sandbox = Sandbox::new(SandboxConfig::default());
        let result = sandbox.execute("n = int(input())\nprint(n * 2)", "21").await;

        assert!(result.success);
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.output, "42");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_fault_is_error_status() {
        let sandbox = Sandbox::new(SandboxConfig::default());
        let result = sandbox.execute("print('a')\nn = int(input())", "").await;

        assert!(!result.success);
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.output, "a");
        assert_eq!(result.error.as_deref(), Some("EOFError: EOF when reading a line"));
    }

    #[tokio::test]
    async fn test_timeout_cancels_runaway_run() {
        let stopped = Arc::new(AtomicBool::new(false));
        let runner = Arc::new(SpinRunner { stopped: Arc::clone(&stopped) });
        let sandbox = Sandbox::with_runner(config(50, 100), runner);

        let result = sandbox.execute("print('x')", "").await;

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.error.as_deref(), Some("Time limit exceeded (50ms)"));

        // The abandoned run must actually stop
        for _ in 0..200 {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_runner_panic_is_contained() {
        let sandbox = Sandbox::with_runner(config(1000, 100), Arc::new(PanicRunner));
        let result = sandbox.execute("print(1)", "").await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(
            result.error.as_deref(),
            Some("Execution aborted: internal interpreter failure")
        );
    }

    #[tokio::test]
    async fn test_output_truncation() {
        let sandbox = Sandbox::new(config(1000, 10));
        let result = sandbox.execute("print('a' * 50)", "").await;

        assert!(result.success);
        assert_eq!(result.output, format!("aaaaaaaaaa{}", TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_oversized_source_rejected() {
        let sandbox = Sandbox::new(SandboxConfig::default());
        let code = "#".repeat(MAX_SOURCE_CODE_BYTES + 1);
        let result = sandbox.execute(&code, "").await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.unwrap().contains("maximum size"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_state() {
        let sandbox = Sandbox::new(SandboxConfig::default());
        let code = "name = input()\nprint(f'hello {name}')";

        let (a, b) = tokio::join!(sandbox.execute(code, "ann"), sandbox.execute(code, "bob"));

        assert_eq!(a.output, "hello ann");
        assert_eq!(b.output, "hello bob");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_output("héllo".to_string(), 2), format!("hé{}", TRUNCATION_MARKER));
        assert_eq!(truncate_output("short".to_string(), 5), "short");
    }
}
