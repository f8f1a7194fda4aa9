//! Flush epoch state machine
//!
//! `Normal` emits immediately. `Buffering` withholds output until every
//! downstream instance has answered the epoch's flush signal.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::stream::{MatrixElement, SessionEnd};

/// Externally visible accumulator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Normal,
    Buffering,
}

/// An epoch waiting for its barrier
#[derive(Debug)]
pub struct BufferingEpoch {
    epoch: u64,
    opened_at: Instant,
    acked: BTreeSet<u32>,
    buffered: Vec<MatrixElement>,
    warned: bool,
}

/// Why a session-end did not count toward the barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No epoch in flight
    NotBuffering,
    /// Ack for an earlier (or unknown) epoch
    StaleEpoch { current: u64 },
    /// This downstream instance already answered the epoch
    Duplicate,
    /// Downstream id is not in `[0, P)`
    UnknownDownstream,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::NotBuffering => "not_buffering",
            IgnoreReason::StaleEpoch { .. } => "stale_epoch",
            IgnoreReason::Duplicate => "duplicate",
            IgnoreReason::UnknownDownstream => "unknown_downstream",
        }
    }
}

/// Result of offering a session-end to the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Counted; barrier still open
    Pending { received: usize, expected: u32 },
    /// Barrier closed; `released` buffered elements handed back
    Released { epoch: u64, released: usize },
    /// Not counted, no transition
    Ignored(IgnoreReason),
}

/// Tagged flush state
#[derive(Debug, Default)]
pub enum FlushEpoch {
    #[default]
    Normal,
    Buffering(BufferingEpoch),
}

impl FlushEpoch {
    pub fn state(&self) -> AccumulatorState {
        match self {
            FlushEpoch::Normal => AccumulatorState::Normal,
            FlushEpoch::Buffering(_) => AccumulatorState::Buffering,
        }
    }

    /// Enter `Buffering` for `epoch`. Returns `false` (no-op) when an
    /// epoch is already in flight.
    pub fn open(&mut self, epoch: u64, now: Instant) -> bool {
        if let FlushEpoch::Buffering(_) = self {
            return false;
        }
        *self = FlushEpoch::Buffering(BufferingEpoch {
            epoch,
            opened_at: now,
            acked: BTreeSet::new(),
            buffered: Vec::new(),
            warned: false,
        });
        true
    }

    /// Withhold `elements` while buffering. Hands them back when `Normal`.
    pub fn buffer(&mut self, elements: Vec<MatrixElement>) -> Result<(), Vec<MatrixElement>> {
        match self {
            FlushEpoch::Buffering(b) => {
                b.buffered.extend(elements);
                Ok(())
            }
            FlushEpoch::Normal => Err(elements),
        }
    }

    /// True exactly once per epoch, the first time the buffer reaches
    /// `threshold`
    pub fn crossed_threshold(&mut self, threshold: usize) -> bool {
        match self {
            FlushEpoch::Buffering(b) if !b.warned && b.buffered.len() >= threshold => {
                b.warned = true;
                true
            }
            _ => false,
        }
    }

    /// Count a session-end from downstream instance `ack.downstream`.
    ///
    /// Releases once `expected` distinct instances answered the current
    /// epoch. The buffered elements, in production order, come back
    /// alongside `Released` and are empty otherwise.
    pub fn record_session_end(
        &mut self,
        ack: &SessionEnd,
        expected: u32,
    ) -> (AckOutcome, Vec<MatrixElement>) {
        let b = match self {
            FlushEpoch::Buffering(b) => b,
            FlushEpoch::Normal => {
                return (AckOutcome::Ignored(IgnoreReason::NotBuffering), Vec::new())
            }
        };

        let ignored = if ack.epoch != b.epoch {
            Some(IgnoreReason::StaleEpoch { current: b.epoch })
        } else if ack.downstream >= expected {
            Some(IgnoreReason::UnknownDownstream)
        } else if !b.acked.insert(ack.downstream) {
            Some(IgnoreReason::Duplicate)
        } else {
            None
        };
        if let Some(reason) = ignored {
            return (AckOutcome::Ignored(reason), Vec::new());
        }

        if b.acked.len() as u32 == expected {
            let epoch = b.epoch;
            let elements = std::mem::take(&mut b.buffered);
            *self = FlushEpoch::Normal;
            let outcome = AckOutcome::Released {
                epoch,
                released: elements.len(),
            };
            (outcome, elements)
        } else {
            let outcome = AckOutcome::Pending {
                received: b.acked.len(),
                expected,
            };
            (outcome, Vec::new())
        }
    }

    /// Give up on an epoch older than `deadline`, returning its buffered
    /// elements in production order
    pub fn abandon_if_expired(
        &mut self,
        now: Instant,
        deadline: Duration,
    ) -> Option<(u64, Vec<MatrixElement>)> {
        let expired = match self {
            FlushEpoch::Buffering(b) => now.saturating_duration_since(b.opened_at) >= deadline,
            FlushEpoch::Normal => false,
        };
        if !expired {
            return None;
        }

        match std::mem::take(self) {
            FlushEpoch::Buffering(b) => Some((b.epoch, b.buffered)),
            FlushEpoch::Normal => None,
        }
    }

    pub fn current_epoch(&self) -> Option<u64> {
        match self {
            FlushEpoch::Buffering(b) => Some(b.epoch),
            FlushEpoch::Normal => None,
        }
    }

    pub fn opened_at(&self) -> Option<Instant> {
        match self {
            FlushEpoch::Buffering(b) => Some(b.opened_at),
            FlushEpoch::Normal => None,
        }
    }

    /// Distinct session-ends counted for the current epoch
    pub fn pending_acks(&self) -> usize {
        match self {
            FlushEpoch::Buffering(b) => b.acked.len(),
            FlushEpoch::Normal => 0,
        }
    }

    pub fn buffered_len(&self) -> usize {
        match self {
            FlushEpoch::Buffering(b) => b.buffered.len(),
            FlushEpoch::Normal => 0,
        }
    }
}
