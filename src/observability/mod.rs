//! Observability subsystem
//!
//! This module provides:
//! - Structured logging (JSON lines)
//! - Typed lifecycle and protocol events
//! - Atomic counters
//!
//! Observability never changes stream behaviour and never fails the stream.
//!
//! # Usage
//!
//! ```ignore
//! use pirstream::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::FlushEpochOpened, &[("epoch", "3")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_epochs_opened();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Severity an event is logged at
pub fn event_severity(event: Event) -> Severity {
    if event.is_warning() {
        Severity::Warn
    } else if event.is_chatty() {
        Severity::Trace
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(event_severity(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event_severity(event), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_severity() {
        assert_eq!(event_severity(Event::EncryptFailed), Severity::Warn);
        assert_eq!(event_severity(Event::SessionEndAccepted), Severity::Trace);
        assert_eq!(event_severity(Event::FlushEpochOpened), Severity::Info);
    }

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::BootStart);
        log_event_with_fields(Event::ConfigLoaded, &[("path", "/tmp/pir.json")]);
    }
}
