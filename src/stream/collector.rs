//! Output seam for stream stages

use super::signals::{DeliveryTag, FlushSignal};

/// Where a stage sends its output and its upstream acknowledgments
pub trait Collector<T> {
    /// Emit one item on the data channel
    fn emit(&mut self, item: T);

    /// Acknowledge an inbound delivery back to the transport
    fn ack(&mut self, tag: DeliveryTag);
}

/// Flush channel to the downstream tier
pub trait FlushBroadcast {
    /// Send `signal` to every downstream instance
    fn broadcast_flush(&mut self, signal: FlushSignal);
}

/// Collector that records everything in memory, in order
#[derive(Debug)]
pub struct MemoryCollector<T> {
    pub emitted: Vec<T>,
    pub acked: Vec<DeliveryTag>,
    pub flushes: Vec<FlushSignal>,
}

impl<T> Default for MemoryCollector<T> {
    fn default() -> Self {
        Self {
            emitted: Vec::new(),
            acked: Vec::new(),
            flushes: Vec::new(),
        }
    }
}

impl<T> MemoryCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the emitted items, leaving acks and flushes in place
    pub fn drain_emitted(&mut self) -> Vec<T> {
        std::mem::take(&mut self.emitted)
    }
}

impl<T> Collector<T> for MemoryCollector<T> {
    fn emit(&mut self, item: T) {
        self.emitted.push(item);
    }

    fn ack(&mut self, tag: DeliveryTag) {
        self.acked.push(tag);
    }
}

impl<T> FlushBroadcast for MemoryCollector<T> {
    fn broadcast_flush(&mut self, signal: FlushSignal) {
        self.flushes.push(signal);
    }
}
