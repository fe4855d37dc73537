//! Parse errors for sovereign assembly source.

use thiserror::Error;

/// Error produced while parsing assembly text.
///
/// Carries the 1-based line and column of the offending token. Parsing
/// stops at the first error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub column: usize,
    /// Human-readable description of the failure.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}
