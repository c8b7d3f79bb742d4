use thiserror::Error;

/// Faults that reject a whole submission before any test case runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradeError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Runtime faults raised by a guest program. Local to one test case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("EOFError: EOF when reading a line")]
    EndOfInput,

    #[error("ValueError: {0}")]
    Value(String),

    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ZeroDivisionError: division by zero")]
    ZeroDivision,

    #[error("MemoryError: {0}")]
    Memory(String),

    #[error("Execution cancelled")]
    Cancelled,
}
