//! Row Accumulator
//!
//! Receives `(rowIndex, partitions)` tuples, encrypts the partitions and
//! emits `(columnIndex, encryptedValue, salt)` contributions.
//!
//! Every flush period it broadcasts a flush signal to the downstream
//! aggregation tier and resets all row counters. From then on outgoing
//! contributions are buffered until a session-end has been received from
//! each of the P downstream instances.
//!
//! One instance processes one event at a time to completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::encryptor::RowEncryptor;
use super::epoch::{AccumulatorState, AckOutcome, FlushEpoch};
use super::salt::ColumnSalter;
use super::state::{RecordVerdict, RowState, RowStates, SplitRecords};
use crate::config::ResponderConfig;
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry};
use crate::query::QueryContext;
use crate::stream::{
    Collector, Delivery, FlushBroadcast, FlushSignal, MatrixElement, RowTuple, SessionEnd,
};

/// Behaviour switches for one accumulator instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorSettings {
    pub limit_hits_per_selector: bool,
    pub max_hits_per_selector: u64,
    /// P, the number of session-ends that close a barrier
    pub downstream_parallelism: u32,
    pub salt_columns: bool,
    pub row_divisions: u32,
    /// `None` waits for the barrier forever
    pub ack_deadline: Option<Duration>,
    pub buffer_warn_threshold: usize,
}

impl AccumulatorSettings {
    /// No hit limit, no salting, no deadline
    pub fn new(downstream_parallelism: u32) -> Self {
        Self {
            limit_hits_per_selector: false,
            max_hits_per_selector: u64::MAX,
            downstream_parallelism,
            salt_columns: false,
            row_divisions: 1,
            ack_deadline: None,
            buffer_warn_threshold: usize::MAX,
        }
    }

    pub fn from_config(config: &ResponderConfig) -> Self {
        Self {
            limit_hits_per_selector: config.limit_hits_per_selector,
            max_hits_per_selector: config.max_hits_per_selector,
            downstream_parallelism: config.downstream_parallelism,
            salt_columns: config.salt_columns,
            row_divisions: config.row_divisions,
            ack_deadline: config.ack_deadline_duration(),
            buffer_warn_threshold: config.buffer_warn_threshold,
        }
    }

    pub fn with_hit_limit(mut self, max_hits_per_selector: u64) -> Self {
        self.limit_hits_per_selector = true;
        self.max_hits_per_selector = max_hits_per_selector;
        self
    }

    pub fn with_salting(mut self, row_divisions: u32) -> Self {
        self.salt_columns = true;
        self.row_divisions = row_divisions;
        self
    }

    pub fn with_ack_deadline(mut self, deadline: Duration) -> Self {
        self.ack_deadline = Some(deadline);
        self
    }

    pub fn with_buffer_warn_threshold(mut self, threshold: usize) -> Self {
        self.buffer_warn_threshold = threshold;
        self
    }

    fn salter(&self) -> ColumnSalter {
        if self.salt_columns {
            ColumnSalter::enabled(self.row_divisions)
        } else {
            ColumnSalter::disabled()
        }
    }
}

/// What a data event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    /// Elements went straight to the data channel
    Emitted(usize),
    /// Elements were withheld for the open epoch
    Buffered(usize),
    /// Row at its hit cap; no output
    HitLimited,
    /// Encryption failed; no output, counters untouched
    EncryptFailed,
    /// Later tuple of a split record whose first tuple was rejected
    RecordDropped,
}

/// What a timer event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Flush signal broadcast, now buffering
    Opened(FlushSignal),
    /// An epoch is already in flight
    AlreadyBuffering,
    /// The in-flight epoch passed its deadline and was released
    Abandoned { epoch: u64, released: usize },
}

/// Single-instance accumulation state machine
pub struct RowAccumulator {
    instance: u32,
    settings: AccumulatorSettings,
    context: Arc<QueryContext>,
    encryptor: Arc<dyn RowEncryptor>,
    rows: RowStates,
    split_records: SplitRecords,
    epoch: FlushEpoch,
    next_epoch: u64,
    salter: ColumnSalter,
    metrics: Arc<MetricsRegistry>,
    emitted_since_flush: bool,
}

impl RowAccumulator {
    pub fn new(
        instance: u32,
        settings: AccumulatorSettings,
        context: Arc<QueryContext>,
        encryptor: Arc<dyn RowEncryptor>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let salter = settings.salter();
        Self {
            instance,
            settings,
            context,
            encryptor,
            rows: RowStates::new(),
            split_records: SplitRecords::new(),
            epoch: FlushEpoch::Normal,
            next_epoch: 1,
            salter,
            metrics,
            emitted_since_flush: false,
        }
    }

    /// Replace the salter (seeded runs)
    pub fn with_salter(mut self, salter: ColumnSalter) -> Self {
        self.salter = salter;
        self
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn settings(&self) -> &AccumulatorSettings {
        &self.settings
    }

    pub fn state(&self) -> AccumulatorState {
        self.epoch.state()
    }

    pub fn row_state(&self, row_index: u32) -> Option<RowState> {
        self.rows.get(row_index)
    }

    pub fn tracked_rows(&self) -> usize {
        self.rows.len()
    }

    /// Split records with tuples still to come
    pub fn open_split_records(&self) -> usize {
        self.split_records.len()
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.epoch.current_epoch()
    }

    pub fn pending_acks(&self) -> usize {
        self.epoch.pending_acks()
    }

    pub fn buffered_len(&self) -> usize {
        self.epoch.buffered_len()
    }

    /// Whether anything reached the data channel since the last flush
    /// signal
    pub fn has_unflushed_output(&self) -> bool {
        self.emitted_since_flush
    }

    /// Data event. Always processed, always acknowledged.
    pub fn on_data<C>(&mut self, delivery: Delivery<RowTuple>, out: &mut C) -> DataOutcome
    where
        C: Collector<MatrixElement>,
    {
        let Delivery { tag, body } = delivery;
        let outcome = self.accumulate(body, out);
        out.ack(tag);
        self.metrics.increment_acks_sent();
        outcome
    }

    /// Hit limit and `hit_count` apply per record: a split record is
    /// admitted or dropped as a whole at its first tuple.
    fn accumulate<C>(&mut self, tuple: RowTuple, out: &mut C) -> DataOutcome
    where
        C: Collector<MatrixElement>,
    {
        self.metrics.increment_data_events();
        let row_index = tuple.row_index;

        if !tuple.starts_record() {
            match self.split_records.next_part(row_index) {
                Some(RecordVerdict::Admitted) => return self.encrypt_and_route(tuple, false, out),
                Some(RecordVerdict::Dropped) => return DataOutcome::RecordDropped,
                // First tuple never seen; treat as a record of its own.
                None => {}
            }
        }

        let remaining = tuple.remaining_parts();
        let row = *self.rows.entry(row_index);
        let capped = self.settings.limit_hits_per_selector
            && row.hit_count >= self.settings.max_hits_per_selector;
        if capped {
            self.metrics.increment_hit_limit_drops();
            log_event_with_fields(
                Event::HitLimitReached,
                &[
                    ("instance", &self.instance.to_string()),
                    ("row", &row_index.to_string()),
                    ("hits", &row.hit_count.to_string()),
                ],
            );
            self.split_records
                .open(row_index, RecordVerdict::Dropped, remaining);
            return DataOutcome::HitLimited;
        }

        let outcome = self.encrypt_and_route(tuple, true, out);
        let verdict = match outcome {
            DataOutcome::EncryptFailed => RecordVerdict::Dropped,
            _ => RecordVerdict::Admitted,
        };
        self.split_records.open(row_index, verdict, remaining);
        outcome
    }

    fn encrypt_and_route<C>(&mut self, tuple: RowTuple, counts_hit: bool, out: &mut C) -> DataOutcome
    where
        C: Collector<MatrixElement>,
    {
        let row_index = tuple.row_index;
        let column_offset = self.rows.entry(row_index).column_offset;

        let elements = match self.encryptor.compute_row(
            &tuple.partitions,
            &self.context,
            row_index,
            column_offset,
        ) {
            Ok(elements) => elements,
            Err(e) => {
                self.metrics.increment_encrypt_failures();
                log_event_with_fields(
                    Event::EncryptFailed,
                    &[
                        ("instance", &self.instance.to_string()),
                        ("row", &row_index.to_string()),
                        ("error", &e.to_string()),
                    ],
                );
                self.split_records.reject(row_index);
                return DataOutcome::EncryptFailed;
            }
        };

        let produced = elements.len();
        let row = self.rows.entry(row_index);
        if counts_hit {
            row.advance(produced);
        } else {
            row.add_columns(produced);
        }
        self.metrics.add_elements_produced(produced as u64);

        match self.epoch.buffer(elements) {
            Ok(()) => {
                Logger::trace(
                    "BUFFERING_TUPLE",
                    &[("row", &row_index.to_string()), ("elements", &produced.to_string())],
                );
                self.metrics.add_elements_buffered(produced as u64);
                if self.epoch.crossed_threshold(self.settings.buffer_warn_threshold) {
                    self.metrics.increment_buffer_warnings();
                    log_event_with_fields(
                        Event::BufferThresholdExceeded,
                        &[
                            ("instance", &self.instance.to_string()),
                            ("buffered", &self.epoch.buffered_len().to_string()),
                            ("pending_acks", &self.epoch.pending_acks().to_string()),
                        ],
                    );
                }
                DataOutcome::Buffered(produced)
            }
            Err(elements) => {
                self.emit_all(elements, out);
                DataOutcome::Emitted(produced)
            }
        }
    }

    /// Timer event.
    ///
    /// In `Normal`: broadcast the flush signal, reset row counters, start
    /// buffering. In `Buffering`: no-op unless the ack deadline has passed.
    pub fn on_tick<C>(&mut self, now: Instant, out: &mut C) -> TickOutcome
    where
        C: Collector<MatrixElement> + FlushBroadcast,
    {
        if self.epoch.state() == AccumulatorState::Buffering {
            return self.check_deadline(now, out);
        }

        let signal = FlushSignal {
            source: self.instance,
            epoch: self.next_epoch,
        };
        self.next_epoch += 1;

        out.broadcast_flush(signal);
        let rows_reset = self.rows.len();
        self.rows.clear();
        self.epoch.open(signal.epoch, now);
        self.emitted_since_flush = false;
        self.metrics.increment_epochs_opened();

        log_event_with_fields(
            Event::FlushEpochOpened,
            &[
                ("instance", &self.instance.to_string()),
                ("epoch", &signal.epoch.to_string()),
                ("rows_reset", &rows_reset.to_string()),
                ("expected_acks", &self.settings.downstream_parallelism.to_string()),
            ],
        );
        TickOutcome::Opened(signal)
    }

    fn check_deadline<C>(&mut self, now: Instant, out: &mut C) -> TickOutcome
    where
        C: Collector<MatrixElement>,
    {
        let Some(deadline) = self.settings.ack_deadline else {
            return TickOutcome::AlreadyBuffering;
        };
        self.abandon(now, deadline, out)
    }

    /// Release the in-flight epoch without its barrier. Used when no
    /// session-end can arrive any more.
    pub fn force_abandon<C>(&mut self, now: Instant, out: &mut C) -> TickOutcome
    where
        C: Collector<MatrixElement>,
    {
        self.abandon(now, Duration::ZERO, out)
    }

    fn abandon<C>(&mut self, now: Instant, deadline: Duration, out: &mut C) -> TickOutcome
    where
        C: Collector<MatrixElement>,
    {
        let pending = self.epoch.pending_acks();
        let Some((epoch, elements)) = self.epoch.abandon_if_expired(now, deadline) else {
            return TickOutcome::AlreadyBuffering;
        };

        let released = elements.len();
        self.metrics.increment_epochs_abandoned();
        log_event_with_fields(
            Event::FlushEpochAbandoned,
            &[
                ("instance", &self.instance.to_string()),
                ("epoch", &epoch.to_string()),
                ("received_acks", &pending.to_string()),
                ("expected_acks", &self.settings.downstream_parallelism.to_string()),
                ("released", &released.to_string()),
            ],
        );
        self.emit_all(elements, out);
        TickOutcome::Abandoned { epoch, released }
    }

    /// Session-end acknowledgment from one downstream instance.
    /// Always acknowledged upstream, counted only when it belongs to the
    /// epoch in flight.
    pub fn on_session_end<C>(&mut self, delivery: Delivery<SessionEnd>, out: &mut C) -> AckOutcome
    where
        C: Collector<MatrixElement>,
    {
        let Delivery { tag, body } = delivery;
        let opened_at = self.epoch.opened_at();
        let (outcome, released) = self
            .epoch
            .record_session_end(&body, self.settings.downstream_parallelism);

        match outcome {
            AckOutcome::Pending { received, expected } => {
                self.metrics.increment_session_ends_accepted();
                log_event_with_fields(
                    Event::SessionEndAccepted,
                    &[
                        ("instance", &self.instance.to_string()),
                        ("epoch", &body.epoch.to_string()),
                        ("received", &received.to_string()),
                        ("expected", &expected.to_string()),
                    ],
                );
            }
            AckOutcome::Released { epoch, released } => {
                self.metrics.increment_session_ends_accepted();
                self.metrics.increment_epochs_released();
                let waited_ms = opened_at
                    .map(|t| t.elapsed().as_millis())
                    .unwrap_or_default();
                log_event_with_fields(
                    Event::FlushEpochReleased,
                    &[
                        ("instance", &self.instance.to_string()),
                        ("epoch", &epoch.to_string()),
                        ("released", &released.to_string()),
                        ("waited_ms", &waited_ms.to_string()),
                    ],
                );
            }
            AckOutcome::Ignored(reason) => {
                self.metrics.increment_session_ends_ignored();
                log_event_with_fields(
                    Event::SessionEndIgnored,
                    &[
                        ("instance", &self.instance.to_string()),
                        ("epoch", &body.epoch.to_string()),
                        ("downstream", &body.downstream.to_string()),
                        ("reason", reason.as_str()),
                    ],
                );
            }
        }

        // Buffered output leaves strictly before anything produced after
        // the barrier.
        self.emit_all(released, out);

        out.ack(tag);
        self.metrics.increment_acks_sent();
        outcome
    }

    fn emit_all<C>(&mut self, elements: Vec<MatrixElement>, out: &mut C)
    where
        C: Collector<MatrixElement>,
    {
        if elements.is_empty() {
            return;
        }
        self.metrics.add_elements_emitted(elements.len() as u64);
        self.emitted_since_flush = true;
        for element in elements {
            out.emit(self.salter.apply(element));
        }
    }
}
