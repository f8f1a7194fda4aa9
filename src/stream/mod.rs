//! # Stream Contract
//!
//! Tuple and signal shapes exchanged between the partitioner, the
//! accumulator and the downstream aggregation tier, plus the
//! [`Collector`] seam every stage emits and acknowledges through.
//!
//! Channels:
//! - **data**: `RowTuple` (partitioner → accumulator),
//!   `MatrixElement` (accumulator → aggregation tier)
//! - **flush**: `FlushSignal` broadcast to all P downstream instances
//! - **session-end**: `SessionEnd`, one per downstream instance, back to
//!   the accumulator that sent the flush

mod collector;
mod signals;

pub use collector::{Collector, FlushBroadcast, MemoryCollector};
pub use signals::{Delivery, DeliveryTag, FlushSignal, MatrixElement, RowTuple, SessionEnd};
