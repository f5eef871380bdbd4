//! User-facing diagnostics and the internal-contract error type.
//!
//! Stage errors (`LexError`, `SyntaxError`, ...) stay typed for callers that
//! match on them; the pipeline flattens each into a [`Diagnostic`] for
//! reporting, ordered by stage and then by emission order within the stage.

use serde::Serialize;
use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::SyntaxError;
use crate::sema::SemanticError;
use crate::vm::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lexer,
    Parser,
    Sema,
    Ir,
    Cfg,
    Runtime,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Lexer => "lexer",
            Stage::Parser => "parser",
            Stage::Sema => "sema",
            Stage::Ir => "ir",
            Stage::Cfg => "cfg",
            Stage::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One reportable finding. `line`/`col` are 1-based; `0` means the finding
/// has no single source position (whole-program errors, runtime columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl Diagnostic {
    pub fn error(stage: Stage, message: impl Into<String>, line: u32, col: u32) -> Self {
        Diagnostic {
            severity: Severity::Error,
            stage,
            message: message.into(),
            line,
            col,
        }
    }

    pub fn warning(stage: Stage, message: impl Into<String>, line: u32, col: u32) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            stage,
            message: message.into(),
            line,
            col,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.line == 0 {
            write!(f, "{severity}[{}]: {}", self.stage, self.message)
        } else {
            write!(
                f,
                "{severity}[{}] {}:{}: {}",
                self.stage, self.line, self.col, self.message
            )
        }
    }
}

impl From<&LexError> for Diagnostic {
    fn from(err: &LexError) -> Self {
        Diagnostic::error(Stage::Lexer, err.to_string(), err.line(), err.col())
    }
}

impl From<&SyntaxError> for Diagnostic {
    fn from(err: &SyntaxError) -> Self {
        Diagnostic::error(Stage::Parser, err.to_string(), err.line(), err.col())
    }
}

impl From<&SemanticError> for Diagnostic {
    fn from(err: &SemanticError) -> Self {
        Diagnostic::error(Stage::Sema, err.to_string(), err.line(), err.col())
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(err: &RuntimeError) -> Self {
        Diagnostic::error(Stage::Runtime, err.to_string(), err.line(), 0)
    }
}

/// A broken invariant between stages, not a user error. Callers that hit one
/// have fed a stage input that violates its contract (for example lowering an
/// analysis that still holds errors); the pipeline downgrades an escaped one
/// to an error [`Diagnostic`] rather than panicking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    pub message: String,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        InternalError {
            message: message.into(),
        }
    }
}
