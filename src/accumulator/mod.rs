//! # Row Accumulator
//!
//! Per-row column accounting, encryption, and the flush-epoch barrier:
//! - `Normal`: encrypted contributions go straight downstream
//! - a timer tick broadcasts a flush signal, resets row counters and
//!   enters `Buffering`
//! - `Buffering`: contributions are withheld until P distinct session-end
//!   acks for the epoch arrive, then released in production order
//!
//! [`RowAccumulator`] is the synchronous state machine;
//! [`AccumulatorTask`] drives it from channels and a timer.

mod encryptor;
mod epoch;
mod errors;
mod row_accumulator;
mod salt;
mod state;
mod task;

pub use encryptor::{ModPowEncryptor, RowEncryptor};
pub use epoch::{AccumulatorState, AckOutcome, FlushEpoch, IgnoreReason};
pub use errors::{EncryptError, EncryptResult};
pub use row_accumulator::{AccumulatorSettings, DataOutcome, RowAccumulator, TickOutcome};
pub use salt::ColumnSalter;
pub use state::{RecordVerdict, RowState, RowStates, SplitRecords};
pub use task::{downstream_slot, AccumulatorTask, DownstreamOutputs};
