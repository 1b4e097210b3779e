//! Parser error types

use thiserror::Error;

/// Errors raised while building parsers or parsing lines
#[derive(Error, Debug)]
pub enum ParseError {
    /// Parser type is not known to the factory
    #[error("Unsupported parser type: {0}")]
    UnsupportedType(String),

    /// Parser configuration rejected at construction
    #[error("Invalid parser configuration: {0}")]
    Config(String),

    /// Parser type is declared but has no implementation
    #[error("{0} parser not yet implemented")]
    NotImplemented(String),

    /// A single line could not be turned into a record
    #[error("Line {line}: {reason}")]
    Line { line: usize, reason: String },

    /// Parsing was started outside a Tokio runtime
    #[error("Parsing requires a Tokio runtime")]
    NoRuntime,

    /// Reading the source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub(crate) fn line(line: usize, reason: impl Into<String>) -> Self {
        ParseError::Line {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type alias for parser operations
pub type ParseResult<T> = Result<T, ParseError>;
