//! # Pipeline Errors

use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline wiring and delivery errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Session-end names an accumulator instance that does not exist
    #[error("Unknown accumulator instance {source_id} (instances: {instances})")]
    UnknownSource { source_id: u32, instances: usize },

    /// The receiving actor has stopped
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// An actor task panicked or was cancelled
    #[error("Actor join failed: {0}")]
    JoinFailed(String),
}
