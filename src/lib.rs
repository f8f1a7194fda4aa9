//! pirstream - streaming accumulation tier of a PIR responder
//!
//! Records flow through a selector partitioner into row accumulators,
//! which encrypt payload partitions against a shared query context and
//! hand the contributions to a downstream aggregation tier under a
//! flush-epoch barrier.

pub mod accumulator;
pub mod cli;
pub mod config;
pub mod observability;
pub mod partitioner;
pub mod pipeline;
pub mod query;
pub mod stream;
