//! # Partitioner Errors

use thiserror::Error;

/// Result type for partitioner operations
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Per-record failures. None of them stop the stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// Decode failure: the raw record is not JSON
    #[error("Unable to parse record: {0}")]
    Parse(String),

    /// Decode failure: valid JSON but not an object
    #[error("Record is not a JSON object")]
    NotAnObject,

    /// Processing failure: a configured field is absent or null
    #[error("Record has no value for field '{0}'")]
    MissingField(String),
}

impl PartitionError {
    /// Decode failures, as opposed to hashing/partitioning failures
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, PartitionError::Parse(_) | PartitionError::NotAnObject)
    }
}
