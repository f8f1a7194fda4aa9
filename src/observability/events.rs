//! Observable lifecycle and protocol events
//!
//! Events are explicit and typed. `as_str()` is the log event name.

use std::fmt;

/// Observable events in the accumulation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Process startup begins
    BootStart,
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Query context constructed (first caller only)
    QueryContextBuilt,
    /// Partitioner worker started
    PartitionerStarted,
    /// Partitioner worker stopped after its inbox closed
    PartitionerStopped,
    /// Accumulator instance started
    AccumulatorStarted,
    /// Accumulator instance finished draining and stopped
    AccumulatorStopped,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,
    /// Input exhausted and every actor drained
    StreamComplete,
    /// Final counter values
    MetricsSnapshot,

    // Per-record failures
    /// Raw record was not a JSON object
    RecordParseFailed,
    /// Selector extraction or partitioning failed
    PartitionFailed,
    /// Encryption primitive failed, row counters untouched
    EncryptFailed,
    /// Row reached its hit cap, event dropped
    HitLimitReached,

    // Flush protocol
    /// Flush signal broadcast, buffering begins
    FlushEpochOpened,
    /// All session-end acks received, buffer released
    FlushEpochReleased,
    /// Ack deadline passed, buffer released without the full barrier
    FlushEpochAbandoned,
    /// Session-end accepted for the current epoch
    SessionEndAccepted,
    /// Session-end ignored (stale epoch, duplicate, or not buffering)
    SessionEndIgnored,
    /// Buffered elements crossed the warning threshold
    BufferThresholdExceeded,

    // Downstream
    /// A downstream channel refused a tuple or signal
    EmitFailed,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::QueryContextBuilt => "QUERY_CONTEXT_BUILT",
            Event::PartitionerStarted => "PARTITIONER_STARTED",
            Event::PartitionerStopped => "PARTITIONER_STOPPED",
            Event::AccumulatorStarted => "ACCUMULATOR_STARTED",
            Event::AccumulatorStopped => "ACCUMULATOR_STOPPED",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::StreamComplete => "STREAM_COMPLETE",
            Event::MetricsSnapshot => "METRICS_SNAPSHOT",
            Event::RecordParseFailed => "RECORD_PARSE_FAILED",
            Event::PartitionFailed => "PARTITION_FAILED",
            Event::EncryptFailed => "ENCRYPT_FAILED",
            Event::HitLimitReached => "HIT_LIMIT_REACHED",
            Event::FlushEpochOpened => "FLUSH_EPOCH_OPENED",
            Event::FlushEpochReleased => "FLUSH_EPOCH_RELEASED",
            Event::FlushEpochAbandoned => "FLUSH_EPOCH_ABANDONED",
            Event::SessionEndAccepted => "SESSION_END_ACCEPTED",
            Event::SessionEndIgnored => "SESSION_END_IGNORED",
            Event::BufferThresholdExceeded => "BUFFER_THRESHOLD_EXCEEDED",
            Event::EmitFailed => "EMIT_FAILED",
        }
    }

    /// Events that indicate degraded behaviour are logged at WARN.
    ///
    /// Nothing in the stream path is fatal.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::RecordParseFailed
                | Event::PartitionFailed
                | Event::EncryptFailed
                | Event::FlushEpochAbandoned
                | Event::SessionEndIgnored
                | Event::BufferThresholdExceeded
                | Event::EmitFailed
        )
    }

    /// High-rate events that are only worth a TRACE line
    pub fn is_chatty(&self) -> bool {
        matches!(self, Event::SessionEndAccepted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
