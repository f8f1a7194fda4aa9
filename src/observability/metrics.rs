//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Shared by `Arc` between the partitioner and every accumulator instance

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters. Relaxed ordering; values are exact once all
/// writers have stopped.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    records_received: AtomicU64,
    records_unparseable: AtomicU64,
    records_unpartitionable: AtomicU64,
    row_tuples_emitted: AtomicU64,
    data_events: AtomicU64,
    elements_produced: AtomicU64,
    elements_emitted: AtomicU64,
    elements_buffered: AtomicU64,
    hit_limit_drops: AtomicU64,
    encrypt_failures: AtomicU64,
    epochs_opened: AtomicU64,
    epochs_released: AtomicU64,
    epochs_abandoned: AtomicU64,
    buffer_warnings: AtomicU64,
    session_ends_accepted: AtomicU64,
    session_ends_ignored: AtomicU64,
    acks_sent: AtomicU64,
    emit_failures: AtomicU64,
    ack_failures: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Partitioner

    pub fn increment_records_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_unparseable(&self) {
        self.records_unparseable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_records_unpartitionable(&self) {
        self.records_unpartitionable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_row_tuples_emitted(&self, count: u64) {
        self.row_tuples_emitted.fetch_add(count, Ordering::Relaxed);
    }

    // Accumulator

    pub fn increment_data_events(&self) {
        self.data_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_elements_produced(&self, count: u64) {
        self.elements_produced.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_elements_emitted(&self, count: u64) {
        self.elements_emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_elements_buffered(&self, count: u64) {
        self.elements_buffered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_hit_limit_drops(&self) {
        self.hit_limit_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_encrypt_failures(&self) {
        self.encrypt_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Flush protocol

    pub fn increment_epochs_opened(&self) {
        self.epochs_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_epochs_released(&self) {
        self.epochs_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_epochs_abandoned(&self) {
        self.epochs_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_buffer_warnings(&self) {
        self.buffer_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_session_ends_accepted(&self) {
        self.session_ends_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_session_ends_ignored(&self) {
        self.session_ends_ignored.fetch_add(1, Ordering::Relaxed);
    }

    // Transport

    pub fn increment_acks_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_emit_failures(&self) {
        self.emit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ack_failures(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            records_received: load(&self.records_received),
            records_unparseable: load(&self.records_unparseable),
            records_unpartitionable: load(&self.records_unpartitionable),
            row_tuples_emitted: load(&self.row_tuples_emitted),
            data_events: load(&self.data_events),
            elements_produced: load(&self.elements_produced),
            elements_emitted: load(&self.elements_emitted),
            elements_buffered: load(&self.elements_buffered),
            hit_limit_drops: load(&self.hit_limit_drops),
            encrypt_failures: load(&self.encrypt_failures),
            epochs_opened: load(&self.epochs_opened),
            epochs_released: load(&self.epochs_released),
            epochs_abandoned: load(&self.epochs_abandoned),
            buffer_warnings: load(&self.buffer_warnings),
            session_ends_accepted: load(&self.session_ends_accepted),
            session_ends_ignored: load(&self.session_ends_ignored),
            acks_sent: load(&self.acks_sent),
            emit_failures: load(&self.emit_failures),
            ack_failures: load(&self.ack_failures),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_received: u64,
    pub records_unparseable: u64,
    pub records_unpartitionable: u64,
    pub row_tuples_emitted: u64,
    pub data_events: u64,
    pub elements_produced: u64,
    pub elements_emitted: u64,
    pub elements_buffered: u64,
    pub hit_limit_drops: u64,
    pub encrypt_failures: u64,
    pub epochs_opened: u64,
    pub epochs_released: u64,
    pub epochs_abandoned: u64,
    pub buffer_warnings: u64,
    pub session_ends_accepted: u64,
    pub session_ends_ignored: u64,
    pub acks_sent: u64,
    pub emit_failures: u64,
    pub ack_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_records_received();
        registry.increment_records_received();
        registry.add_elements_produced(5);
        registry.add_elements_buffered(3);
        registry.increment_epochs_opened();
        registry.increment_hit_limit_drops();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.records_received, 2);
        assert_eq!(snapshot.elements_produced, 5);
        assert_eq!(snapshot.elements_buffered, 3);
        assert_eq!(snapshot.epochs_opened, 1);
        assert_eq!(snapshot.hit_limit_drops, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_elements_emitted(1234);
        registry.increment_acks_sent();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["elements_emitted"], 1234);
        assert_eq!(parsed["acks_sent"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_data_events();
                    reg.increment_acks_sent();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.data_events, 800);
        assert_eq!(snapshot.acks_sent, 800);
    }
}
