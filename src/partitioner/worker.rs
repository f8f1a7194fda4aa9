//! Async partitioner worker
//!
//! Drains the record inbox, routes each row tuple to the accumulator
//! instance that owns its row, and acknowledges raw records upstream.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::selector::SelectorPartitioner;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::stream::{Collector, Delivery, DeliveryTag, RowTuple};

/// Collector that shards row tuples across accumulator inboxes by
/// `rowIndex % instances` and tags each with a fresh delivery tag.
#[derive(Debug)]
pub struct RowRouter {
    instances: Vec<UnboundedSender<Delivery<RowTuple>>>,
    acks: UnboundedSender<DeliveryTag>,
    next_tag: DeliveryTag,
    metrics: Arc<MetricsRegistry>,
}

impl RowRouter {
    pub fn new(
        instances: Vec<UnboundedSender<Delivery<RowTuple>>>,
        acks: UnboundedSender<DeliveryTag>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            instances,
            acks,
            next_tag: 0,
            metrics,
        }
    }

    /// Accumulator instance owning `row_index`
    pub fn instance_for(&self, row_index: u32) -> usize {
        row_index as usize % self.instances.len().max(1)
    }
}

impl Collector<RowTuple> for RowRouter {
    fn emit(&mut self, tuple: RowTuple) {
        if self.instances.is_empty() {
            return;
        }
        let slot = self.instance_for(tuple.row_index);
        let tag = self.next_tag;
        self.next_tag += 1;

        if self.instances[slot].send(Delivery::new(tag, tuple)).is_err() {
            self.metrics.increment_emit_failures();
            log_event_with_fields(
                Event::EmitFailed,
                &[("channel", "row_tuples"), ("instance", &slot.to_string())],
            );
        }
    }

    fn ack(&mut self, tag: DeliveryTag) {
        // Upstream may have stopped listening for acks; nothing to redeliver then.
        if self.acks.send(tag).is_err() {
            self.metrics.increment_ack_failures();
        }
    }
}

/// One partitioner task
pub struct PartitionerWorker {
    partitioner: SelectorPartitioner,
    inbox: UnboundedReceiver<Delivery<String>>,
    router: RowRouter,
}

impl PartitionerWorker {
    pub fn new(
        partitioner: SelectorPartitioner,
        inbox: UnboundedReceiver<Delivery<String>>,
        router: RowRouter,
    ) -> Self {
        Self {
            partitioner,
            inbox,
            router,
        }
    }

    /// Run until the inbox closes. Dropping the router afterwards closes
    /// every accumulator inbox.
    pub async fn run(mut self) {
        log_event_with_fields(
            Event::PartitionerStarted,
            &[
                ("mode", &format!("{:?}", self.partitioner.mode())),
                ("instances", &self.router.instances.len().to_string()),
            ],
        );

        while let Some(delivery) = self.inbox.recv().await {
            self.partitioner.execute(delivery, &mut self.router);
        }

        log_event_with_fields(
            Event::PartitionerStopped,
            &[("tuples_routed", &self.router.next_tag.to_string())],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::EmissionMode;
    use crate::query::QueryInfo;
    use tokio::sync::mpsc;

    fn info() -> QueryInfo {
        QueryInfo {
            hash_key: "key".into(),
            hash_bit_size: 6,
            data_partition_bit_size: 8,
            selector_field: "sel".into(),
            data_fields: vec!["payload".into()],
        }
    }

    #[tokio::test]
    async fn test_worker_routes_by_row_and_acks() {
        let metrics = Arc::new(MetricsRegistry::new());
        let partitioner = SelectorPartitioner::new(info(), EmissionMode::Batched, Arc::clone(&metrics));
        let expected_row = partitioner.row_index("bob");

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        let router = RowRouter::new(vec![a_tx, b_tx], ack_tx, metrics);
        let worker = PartitionerWorker::new(partitioner, in_rx, router);

        in_tx.send(Delivery::new(10, r#"{"sel":"bob","payload":"hi"}"#.to_string())).unwrap();
        in_tx.send(Delivery::new(11, "garbage".to_string())).unwrap();
        drop(in_tx);
        worker.run().await;

        assert_eq!(ack_rx.recv().await, Some(10));
        assert_eq!(ack_rx.recv().await, Some(11));

        let (owner, other) = if expected_row % 2 == 0 {
            (&mut a_rx, &mut b_rx)
        } else {
            (&mut b_rx, &mut a_rx)
        };
        let delivery = owner.recv().await.unwrap();
        assert_eq!(delivery.body.row_index, expected_row);
        assert_eq!(delivery.tag, 0);
        assert!(owner.recv().await.is_none());
        assert!(other.recv().await.is_none());
    }
}
