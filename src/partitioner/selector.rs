//! Selector Partitioner
//!
//! Receives one raw record at a time. Emits the hash of its selector along
//! with the record's partitioned payload, either as one batched tuple or
//! as one tuple per partition element.

use std::sync::Arc;

use num_bigint::BigUint;

use super::errors::PartitionResult;
use super::hashing::SelectorHasher;
use super::partition::partition_record;
use super::record::Record;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::query::QueryInfo;
use crate::stream::{Collector, Delivery, RowTuple};

const RECORD_PREVIEW_CHARS: usize = 120;

/// Fan-out policy for partition sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionMode {
    /// One `(rowIndex, wholeSequence)` tuple per record
    Batched,
    /// One `(rowIndex, [element])` tuple per partition element. Partitions
    /// of different records may interleave at the same row downstream.
    Split,
}

impl EmissionMode {
    pub fn from_split_flag(split_partitions: bool) -> Self {
        if split_partitions {
            EmissionMode::Split
        } else {
            EmissionMode::Batched
        }
    }
}

/// Stateless record → row tuple stage
#[derive(Debug, Clone)]
pub struct SelectorPartitioner {
    info: QueryInfo,
    hasher: SelectorHasher,
    mode: EmissionMode,
    metrics: Arc<MetricsRegistry>,
}

impl SelectorPartitioner {
    pub fn new(info: QueryInfo, mode: EmissionMode, metrics: Arc<MetricsRegistry>) -> Self {
        let hasher = SelectorHasher::new(&info.hash_key, info.hash_bit_size);
        Self {
            info,
            hasher,
            mode,
            metrics,
        }
    }

    pub fn mode(&self) -> EmissionMode {
        self.mode
    }

    /// Row index for a selector value
    pub fn row_index(&self, selector: &str) -> u32 {
        self.hasher.hash(selector)
    }

    /// Hash the selector and form the partition sequence
    pub fn hash_and_partition(&self, record: &Record) -> PartitionResult<(u32, Vec<BigUint>)> {
        let selector = record.selector(&self.info.selector_field)?;
        let partitions = partition_record(record, &self.info)?;
        Ok((self.row_index(&selector), partitions))
    }

    /// Decode and partition one raw record.
    ///
    /// Failures are logged and yield no tuples; a partial tuple set is never
    /// returned.
    pub fn process(&self, raw: &str) -> Vec<RowTuple> {
        self.metrics.increment_records_received();

        let record = match Record::decode(raw) {
            Ok(record) => record,
            Err(e) => {
                self.metrics.increment_records_unparseable();
                log_event_with_fields(
                    Event::RecordParseFailed,
                    &[("error", &e.to_string()), ("record", &preview(raw))],
                );
                return Vec::new();
            }
        };

        let (row_index, partitions) = match self.hash_and_partition(&record) {
            Ok(pair) => pair,
            Err(e) => {
                self.metrics.increment_records_unpartitionable();
                log_event_with_fields(
                    Event::PartitionFailed,
                    &[("error", &e.to_string()), ("record", &preview(raw))],
                );
                return Vec::new();
            }
        };

        match self.mode {
            EmissionMode::Batched => vec![RowTuple::new(row_index, partitions)],
            EmissionMode::Split => {
                let parts = partitions.len() as u32;
                partitions
                    .into_iter()
                    .enumerate()
                    .map(|(part, p)| RowTuple::split_part(row_index, p, part as u32, parts))
                    .collect()
            }
        }
    }

    /// Process one delivery: emit its tuples, then acknowledge it.
    ///
    /// The delivery is acknowledged whether or not it produced output.
    pub fn execute<C: Collector<RowTuple>>(&self, delivery: Delivery<String>, out: &mut C) {
        let tuples = self.process(&delivery.body);
        self.metrics.add_row_tuples_emitted(tuples.len() as u64);
        for tuple in tuples {
            out.emit(tuple);
        }
        out.ack(delivery.tag);
        self.metrics.increment_acks_sent();
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(RECORD_PREVIEW_CHARS).collect()
}
