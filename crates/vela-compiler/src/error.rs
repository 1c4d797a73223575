//! Error types for compilation.

use thiserror::Error;

/// Errors that can occur while compiling a chunk.
///
/// The `message` fields hold fully rendered diagnostics, including the
/// source excerpt, so callers can print them verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("{message}")]
    Lexical {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("{message}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    /// Well-formed source that breaks a scoping or mutability rule:
    /// assignment to a constant, goto into a live scope, undefined
    /// label, break/continue depth, duplicate to-be-closed variable.
    #[error("{message}")]
    Semantic {
        message: String,
        line: u32,
        column: u32,
    },

    /// A warning whose category was set to `error` by a
    /// `@vela_warnings` directive.
    #[error("{message}")]
    EscalatedWarning {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("function or expression needs too many registers (line {line})")]
    TooComplex { line: u32 },

    #[error("chunk has too many syntax levels (line {line})")]
    TooManyLevels { line: u32 },
}

impl CompileError {
    pub fn line(&self) -> u32 {
        match self {
            CompileError::Lexical { line, .. }
            | CompileError::Syntax { line, .. }
            | CompileError::Semantic { line, .. }
            | CompileError::EscalatedWarning { line, .. }
            | CompileError::TooComplex { line }
            | CompileError::TooManyLevels { line } => *line,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
