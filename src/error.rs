use std::fmt;

/// Error types for sqlx-query-mapper
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed placeholder syntax in an SQL template
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A query method could not be bound to its template
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Error compiling an internal scanning pattern
    #[error("Failed to compile SQL scanning pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Error from SQLx database operations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Error reported by a non-SQLx driver implementation
    #[error("Driver error: {0}")]
    Driver(String),

    /// Batch parameters were collections of unequal length
    #[error("collections have different size")]
    CollectionsDifferentSize,

    /// An atomic select returned no rows
    #[error("empty result set returned")]
    EmptyResult,

    /// A single-valued select returned more than one row
    #[error("more than one result")]
    MoreThanOneResult,

    /// A mapping adapter refused a null value
    #[error("null value not allowed for mapper {0}")]
    NullNotAllowed(String),

    /// A runtime value did not match the type it was bound or read as
    #[error("cannot convert {found} to {expected}")]
    Conversion { expected: String, found: String },

    /// The query method was invoked with the wrong number of arguments
    #[error("expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// A mapping type registration conflicted with existing state
    #[error("Mapping type '{0}' is already registered in this scope")]
    AlreadyRegistered(String),

    /// An environment setting could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The driver does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl Error {
    pub(crate) fn conversion(expected: impl fmt::Display, found: impl fmt::Debug) -> Self {
        Error::Conversion {
            expected: expected.to_string(),
            found: format!("{found:?}"),
        }
    }
}

/// A malformed SQL template, positioned in the original text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at offset {start}, length {length})")]
pub struct ParseError {
    pub message: String,
    pub start: usize,
    pub length: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, start: usize, length: usize) -> Self {
        ParseError {
            message: message.into(),
            start,
            length,
        }
    }
}

/// A query method whose shape does not fit its template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot bind query method '{method}': {reason}")]
pub struct ValidationError {
    pub method: String,
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(method: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for sqlx-query-mapper operations
pub type Result<T> = std::result::Result<T, Error>;
