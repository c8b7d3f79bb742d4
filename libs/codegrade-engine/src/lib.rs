//! Execution and grading engine for coding questions.
//!
//! Guest programs written in a small indentation-based scripting subset are
//! validated, interpreted under a wall-clock limit, compared against expected
//! output and scored.
//!
//! ```text
//! Validator ──▶ Sandbox ──▶ Interpreter
//!                  │
//!                  ▼
//!             Evaluator ──▶ Grader ──▶ SubmissionStore
//! ```

pub mod error;
pub mod evaluator;
pub mod grader;
pub mod interpreter;
pub mod sandbox;
pub mod store;
pub mod validator;


pub use error::{Fault, GradeError};
pub use grader::Grader;
pub use sandbox::{CancelToken, InterpreterRunner, Sandbox, ScriptRunner};
pub use store::SubmissionStore;
