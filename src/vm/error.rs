use thiserror::Error;

use crate::diagnostics::InternalError;

/// Typed errors raised while executing lowered instructions. Every variant
/// except [`RuntimeError::Internal`] carries the source line of the failing
/// instruction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Division by zero at line {line}")]
    DivisionByZero { line: u32 },
    #[error("Unbound variable `{name}` at line {line}")]
    UnboundVariable { name: String, line: u32 },
    #[error("Call depth limit of {limit} exceeded at line {line}")]
    StackOverflow { limit: usize, line: u32 },
    #[error("{message} at line {line}")]
    TypeError { message: String, line: u32 },
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl RuntimeError {
    pub fn line(&self) -> u32 {
        match self {
            RuntimeError::DivisionByZero { line }
            | RuntimeError::UnboundVariable { line, .. }
            | RuntimeError::StackOverflow { line, .. }
            | RuntimeError::TypeError { line, .. } => *line,
            RuntimeError::Internal(_) => 0,
        }
    }
}
