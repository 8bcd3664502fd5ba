//! Error taxonomy (§7). Three layers, mirrored as three top-level variants:
//! compile-time (parse/resolve/check), runtime (the two situations that
//! actually abort execution), and `Exit`, which is not an error but is
//! threaded through the same `Result` plumbing as the driver unwinds.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Resolve(String),
    #[error("{0}")]
    Check(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivByZero,
    #[error("modulo by zero")]
    ModByZero,
    #[error("opcode integrity failure: {0}")]
    Integrity(String),
}

/// `exit(code)` is not an error; it's a distinguishable unwind token that
/// carries the final process exit code once BEGIN/main/END has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitError(pub i32);

/// Top-level error returned from `Program::run`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AwkError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("exit({0})")]
    Exit(i32),
}

impl From<ExitError> for AwkError {
    fn from(e: ExitError) -> Self {
        AwkError::Exit(e.0)
    }
}
