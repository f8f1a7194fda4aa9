//! # Pipeline
//!
//! Wires the partitioner worker to N accumulator actors and exposes the
//! downstream side (P data ports, flush subscriptions, session-end router)
//! to the caller.
//!
//! ```text
//! records ─▶ PartitionerWorker ─row % N─▶ AccumulatorTask[0..N]
//!                                              │ data (column·31+salt) % P
//!                                              │ flush broadcast
//!                                              ▼
//!                                        DownstreamPort[0..P]
//!                                              │ session-end
//!          SessionEndRouter ◀──────────────────┘
//! ```
//!
//! Dropping every [`RecordSender`] starts an orderly shutdown: the
//! partitioner stops, each accumulator drains through a final completed
//! flush epoch, then exits.

mod errors;
mod handles;

pub use errors::{PipelineError, PipelineResult};
pub use handles::{DownstreamPort, PipelineHandles, RecordSender, SessionEndRouter};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::accumulator::{
    AccumulatorSettings, AccumulatorTask, DownstreamOutputs, RowAccumulator, RowEncryptor,
};
use crate::config::ResponderConfig;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};
use crate::partitioner::{EmissionMode, PartitionerWorker, RowRouter, SelectorPartitioner};
use crate::query::QueryContext;

/// Flush signals a lagging downstream subscriber may fall behind by
const FLUSH_CHANNEL_CAPACITY: usize = 1024;

/// Running actor set
pub struct Pipeline {
    partitioner: JoinHandle<()>,
    accumulators: Vec<JoinHandle<RowAccumulator>>,
}

impl Pipeline {
    /// Spawn the partitioner and every accumulator instance on the current
    /// tokio runtime.
    pub fn spawn(
        config: &ResponderConfig,
        context: Arc<QueryContext>,
        encryptor: Arc<dyn RowEncryptor>,
        metrics: Arc<MetricsRegistry>,
    ) -> (Self, PipelineHandles) {
        let instances = config.accumulator_instances.max(1);
        let parallelism = config.downstream_parallelism.max(1);
        let settings = AccumulatorSettings::from_config(config);
        let period = config.time_to_flush_duration();

        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let (record_ack_tx, record_ack_rx) = mpsc::unbounded_channel();
        let (tuple_ack_tx, tuple_ack_rx) = mpsc::unbounded_channel();
        let (session_ack_tx, session_ack_rx) = mpsc::unbounded_channel();
        let (flush_tx, _) = broadcast::channel(FLUSH_CHANNEL_CAPACITY);

        let mut data_txs = Vec::with_capacity(parallelism as usize);
        let mut downstream = Vec::with_capacity(parallelism as usize);
        for index in 0..parallelism {
            let (tx, rx) = mpsc::unbounded_channel();
            data_txs.push(tx);
            downstream.push(DownstreamPort {
                index,
                data: rx,
                flushes: flush_tx.subscribe(),
            });
        }

        let mut tuple_txs = Vec::with_capacity(instances as usize);
        let mut session_txs = Vec::with_capacity(instances as usize);
        let mut accumulators = Vec::with_capacity(instances as usize);
        for instance in 0..instances {
            let (tuple_tx, tuple_rx) = mpsc::unbounded_channel();
            let (session_tx, session_rx) = mpsc::unbounded_channel();
            tuple_txs.push(tuple_tx);
            session_txs.push(session_tx);

            let accumulator = RowAccumulator::new(
                instance,
                settings.clone(),
                Arc::clone(&context),
                Arc::clone(&encryptor),
                Arc::clone(&metrics),
            );
            let outputs = DownstreamOutputs::new(
                data_txs.clone(),
                flush_tx.clone(),
                tuple_ack_tx.clone(),
                session_ack_tx.clone(),
                Arc::clone(&metrics),
            );
            let task = AccumulatorTask::new(accumulator, tuple_rx, session_rx, outputs, period);
            accumulators.push(tokio::spawn(task.run()));
        }

        let partitioner = SelectorPartitioner::new(
            context.info().clone(),
            EmissionMode::from_split_flag(config.split_partitions),
            Arc::clone(&metrics),
        );
        let router = RowRouter::new(tuple_txs, record_ack_tx, Arc::clone(&metrics));
        let worker = PartitionerWorker::new(partitioner, record_rx, router);
        let partitioner = tokio::spawn(worker.run());

        let handles = PipelineHandles {
            records: RecordSender::new(record_tx),
            record_acks: record_ack_rx,
            tuple_acks: tuple_ack_rx,
            session_end_acks: session_ack_rx,
            downstream,
            session_ends: SessionEndRouter::new(session_txs),
        };

        (
            Self {
                partitioner,
                accumulators,
            },
            handles,
        )
    }

    pub fn accumulator_count(&self) -> usize {
        self.accumulators.len()
    }

    /// Wait for every actor to finish. Returns the final accumulator
    /// states, indexed by instance.
    pub async fn join(self) -> PipelineResult<Vec<RowAccumulator>> {
        log_event(Event::ShutdownStart);

        self.partitioner
            .await
            .map_err(|e| PipelineError::JoinFailed(format!("partitioner: {}", e)))?;

        let mut finished = Vec::with_capacity(self.accumulators.len());
        for (instance, handle) in self.accumulators.into_iter().enumerate() {
            let accumulator = handle
                .await
                .map_err(|e| PipelineError::JoinFailed(format!("accumulator {}: {}", instance, e)))?;
            finished.push(accumulator);
        }

        log_event_with_fields(
            Event::ShutdownComplete,
            &[("accumulators", &finished.len().to_string())],
        );
        Ok(finished)
    }
}
