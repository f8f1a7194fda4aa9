//! Async accumulator actor
//!
//! One task per accumulator instance. Data events, session-end events and
//! timer ticks are serialised through a single `select!` loop, so the
//! state machine never sees two events at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::epoch::AccumulatorState;
use super::row_accumulator::RowAccumulator;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::stream::{
    Collector, Delivery, DeliveryTag, FlushBroadcast, FlushSignal, MatrixElement, RowTuple,
    SessionEnd,
};

/// Downstream data slot for an element: fields grouping on column + salt
pub fn downstream_slot(element: &MatrixElement, parallelism: usize) -> usize {
    let salt = u64::from(element.salt.unwrap_or(0));
    let key = element.column_index.wrapping_mul(31).wrapping_add(salt);
    (key % parallelism.max(1) as u64) as usize
}

/// Channels from one accumulator instance to the aggregation tier
#[derive(Debug)]
pub struct DownstreamOutputs {
    data: Vec<UnboundedSender<MatrixElement>>,
    flush: broadcast::Sender<FlushSignal>,
    data_acks: UnboundedSender<DeliveryTag>,
    session_end_acks: UnboundedSender<DeliveryTag>,
    metrics: Arc<MetricsRegistry>,
}

impl DownstreamOutputs {
    pub fn new(
        data: Vec<UnboundedSender<MatrixElement>>,
        flush: broadcast::Sender<FlushSignal>,
        data_acks: UnboundedSender<DeliveryTag>,
        session_end_acks: UnboundedSender<DeliveryTag>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            data,
            flush,
            data_acks,
            session_end_acks,
            metrics,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.data.len()
    }

    fn emit_failed(&self, channel: &str, slot: usize) {
        self.metrics.increment_emit_failures();
        log_event_with_fields(
            Event::EmitFailed,
            &[("channel", channel), ("downstream", &slot.to_string())],
        );
    }

    /// View that acknowledges on the session-end channel
    fn for_session_ends(&mut self) -> SessionEndOutputs<'_> {
        SessionEndOutputs { outputs: self }
    }
}

impl Collector<MatrixElement> for DownstreamOutputs {
    fn emit(&mut self, element: MatrixElement) {
        if self.data.is_empty() {
            return;
        }
        let slot = downstream_slot(&element, self.data.len());
        if self.data[slot].send(element).is_err() {
            self.emit_failed("data", slot);
        }
    }

    fn ack(&mut self, tag: DeliveryTag) {
        if self.data_acks.send(tag).is_err() {
            self.metrics.increment_ack_failures();
        }
    }
}

impl FlushBroadcast for DownstreamOutputs {
    fn broadcast_flush(&mut self, signal: FlushSignal) {
        if self.flush.send(signal).is_err() {
            self.emit_failed("flush", 0);
        }
    }
}

struct SessionEndOutputs<'a> {
    outputs: &'a mut DownstreamOutputs,
}

impl Collector<MatrixElement> for SessionEndOutputs<'_> {
    fn emit(&mut self, element: MatrixElement) {
        self.outputs.emit(element);
    }

    fn ack(&mut self, tag: DeliveryTag) {
        if self.outputs.session_end_acks.send(tag).is_err() {
            self.outputs.metrics.increment_ack_failures();
        }
    }
}

/// Actor driving one [`RowAccumulator`]
pub struct AccumulatorTask {
    accumulator: RowAccumulator,
    data: UnboundedReceiver<Delivery<RowTuple>>,
    session_ends: UnboundedReceiver<Delivery<SessionEnd>>,
    outputs: DownstreamOutputs,
    period: Duration,
}

impl AccumulatorTask {
    pub fn new(
        accumulator: RowAccumulator,
        data: UnboundedReceiver<Delivery<RowTuple>>,
        session_ends: UnboundedReceiver<Delivery<SessionEnd>>,
        outputs: DownstreamOutputs,
        period: Duration,
    ) -> Self {
        Self {
            accumulator,
            data,
            session_ends,
            outputs,
            period,
        }
    }

    /// Run until the data inbox closes and every emitted element is
    /// covered by a completed flush epoch.
    pub async fn run(mut self) -> RowAccumulator {
        let instance = self.accumulator.instance().to_string();
        log_event_with_fields(
            Event::AccumulatorStarted,
            &[
                ("instance", &instance),
                ("period_ms", &self.period.as_millis().to_string()),
                ("downstream", &self.outputs.parallelism().to_string()),
            ],
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut data_open = true;
        let mut session_open = true;

        loop {
            if !session_open && self.accumulator.state() == AccumulatorState::Buffering {
                // No barrier can complete; release what is held.
                self.accumulator
                    .force_abandon(std::time::Instant::now(), &mut self.outputs);
            }
            if !data_open && self.drain_step() {
                break;
            }

            tokio::select! {
                biased;

                ack = self.session_ends.recv(), if session_open => match ack {
                    Some(delivery) => {
                        self.accumulator
                            .on_session_end(delivery, &mut self.outputs.for_session_ends());
                    }
                    None => session_open = false,
                },

                tuple = self.data.recv(), if data_open => match tuple {
                    Some(delivery) => {
                        self.accumulator.on_data(delivery, &mut self.outputs);
                    }
                    None => data_open = false,
                },

                _ = ticker.tick() => {
                    self.accumulator
                        .on_tick(std::time::Instant::now(), &mut self.outputs);
                }
            }
        }

        log_event_with_fields(
            Event::AccumulatorStopped,
            &[
                ("instance", &instance),
                ("tracked_rows", &self.accumulator.tracked_rows().to_string()),
            ],
        );
        self.accumulator
    }

    /// Drain step once the data inbox has closed. Returns `true` when the
    /// actor may exit.
    fn drain_step(&mut self) -> bool {
        match self.accumulator.state() {
            AccumulatorState::Normal if !self.accumulator.has_unflushed_output() => true,
            AccumulatorState::Normal => {
                self.accumulator
                    .on_tick(std::time::Instant::now(), &mut self.outputs);
                false
            }
            AccumulatorState::Buffering => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_downstream_slot_groups_column_and_salt() {
        let a = MatrixElement::new(5, BigUint::from(1u32));
        let b = MatrixElement::new(5, BigUint::from(9u32));
        assert_eq!(downstream_slot(&a, 4), downstream_slot(&b, 4));
        assert_eq!(downstream_slot(&a, 4), (5 * 31) % 4);

        let salted = MatrixElement::new(5, BigUint::from(1u32)).with_salt(2);
        assert_eq!(downstream_slot(&salted, 4), (5 * 31 + 2) % 4);
        assert_eq!(downstream_slot(&salted, 1), 0);
    }
}
