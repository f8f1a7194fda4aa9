//! Caller-side ends of the pipeline channels

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::errors::{PipelineError, PipelineResult};
use crate::stream::{Delivery, DeliveryTag, FlushSignal, MatrixElement, SessionEnd};

/// Submits raw records to the partitioner. Dropping every clone closes
/// the input and starts the drain.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: UnboundedSender<Delivery<String>>,
    next_tag: Arc<AtomicU64>,
}

impl RecordSender {
    pub(crate) fn new(tx: UnboundedSender<Delivery<String>>) -> Self {
        Self {
            tx,
            next_tag: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit one raw record; returns the tag it will be acknowledged with
    pub fn submit(&self, raw: impl Into<String>) -> PipelineResult<DeliveryTag> {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Delivery::new(tag, raw.into()))
            .map_err(|_| PipelineError::ChannelClosed("records".into()))?;
        Ok(tag)
    }
}

/// Routes each session-end to the accumulator instance named by its
/// `source`
#[derive(Debug, Clone)]
pub struct SessionEndRouter {
    instances: Vec<UnboundedSender<Delivery<SessionEnd>>>,
    next_tag: Arc<AtomicU64>,
}

impl SessionEndRouter {
    pub(crate) fn new(instances: Vec<UnboundedSender<Delivery<SessionEnd>>>) -> Self {
        Self {
            instances,
            next_tag: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn instances(&self) -> usize {
        self.instances.len()
    }

    /// Deliver `ack`; returns the tag it will be acknowledged with
    pub fn deliver(&self, ack: SessionEnd) -> PipelineResult<DeliveryTag> {
        let target = self
            .instances
            .get(ack.source as usize)
            .ok_or(PipelineError::UnknownSource {
                source_id: ack.source,
                instances: self.instances.len(),
            })?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        target
            .send(Delivery::new(tag, ack))
            .map_err(|_| PipelineError::ChannelClosed(format!("session_end[{}]", ack.source)))?;
        Ok(tag)
    }
}

/// What one downstream aggregation instance receives
#[derive(Debug)]
pub struct DownstreamPort {
    /// Downstream instance id, `0..P`
    pub index: u32,
    /// Data tuples routed to this instance
    pub data: UnboundedReceiver<MatrixElement>,
    /// Flush signals from every accumulator instance
    pub flushes: broadcast::Receiver<FlushSignal>,
}

/// Everything the caller needs to drive a running pipeline
#[derive(Debug)]
pub struct PipelineHandles {
    pub records: RecordSender,
    /// Tags of raw records the partitioner has processed
    pub record_acks: UnboundedReceiver<DeliveryTag>,
    /// Tags of row tuples the accumulators have processed
    pub tuple_acks: UnboundedReceiver<DeliveryTag>,
    /// Tags of session-ends the accumulators have processed
    pub session_end_acks: UnboundedReceiver<DeliveryTag>,
    /// One port per downstream instance
    pub downstream: Vec<DownstreamPort>,
    pub session_ends: SessionEndRouter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_session_end_router_routes_by_source() {
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let router = SessionEndRouter::new(vec![a_tx, b_tx]);

        let ack = SessionEnd { source: 1, epoch: 3, downstream: 0 };
        assert_eq!(router.deliver(ack).unwrap(), 0);
        assert_eq!(b_rx.try_recv().unwrap().body, ack);
        assert!(a_rx.try_recv().is_err());

        let stray = SessionEnd { source: 5, epoch: 3, downstream: 0 };
        assert_eq!(
            router.deliver(stray),
            Err(PipelineError::UnknownSource { source_id: 5, instances: 2 })
        );
    }

    #[test]
    fn test_record_sender_tags_sequentially() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = RecordSender::new(tx);
        let clone = sender.clone();

        assert_eq!(sender.submit("a").unwrap(), 0);
        assert_eq!(clone.submit("b").unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), Delivery::new(0, "a".to_string()));

        drop(rx);
        assert!(matches!(sender.submit("c"), Err(PipelineError::ChannelClosed(_))));
    }
}
