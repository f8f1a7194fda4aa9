//! # Query Errors

use thiserror::Error;

/// Result type for query context operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors building the query context
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid query parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid modulus: {0}")]
    InvalidModulus(String),

    #[error("Invalid query element at row {row}: {reason}")]
    InvalidElement { row: usize, reason: String },
}
