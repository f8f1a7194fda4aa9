//! # Selector Partitioner
//!
//! Record → `(rowIndex, partitions)`:
//! - decode the raw record (JSON object)
//! - keyed hash of the selector field, bounded by the row count
//! - payload fields cut into fixed-width numeric partitions
//! - batched or split emission
//!
//! Stateless across calls; malformed records are logged and dropped.

mod errors;
mod hashing;
mod partition;
mod record;
mod selector;
mod worker;

pub use errors::{PartitionError, PartitionResult};
pub use hashing::SelectorHasher;
pub use partition::{field_bytes, partition_bytes, partition_record};
pub use record::Record;
pub use selector::{EmissionMode, SelectorPartitioner};
pub use worker::{PartitionerWorker, RowRouter};
