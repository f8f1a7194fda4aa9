//! # Accumulator Errors

use thiserror::Error;

/// Result type for the encryption primitive
pub type EncryptResult<T> = Result<T, EncryptError>;

/// Failures of the encryption primitive. The caller logs and skips the
/// event without advancing row counters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncryptError {
    #[error("Row {row} outside query element table of {rows} rows")]
    RowOutOfRange { row: u32, rows: usize },

    #[error("Resource exhausted while encrypting row: {0}")]
    ResourceExhausted(String),
}
