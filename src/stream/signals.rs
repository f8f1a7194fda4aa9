//! Tuple and signal types

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Transport-assigned identifier, acknowledged once per delivery
pub type DeliveryTag = u64;

/// An inbound event plus the tag the transport expects acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<T> {
    pub tag: DeliveryTag,
    pub body: T,
}

impl<T> Delivery<T> {
    pub fn new(tag: DeliveryTag, body: T) -> Self {
        Self { tag, body }
    }
}

/// `(rowIndex, partitions)` from the partitioner.
///
/// In split mode one record travels as `parts` tuples, each holding exactly
/// one element; `part` is its position within the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTuple {
    pub row_index: u32,
    pub partitions: Vec<BigUint>,
    pub part: u32,
    pub parts: u32,
}

impl RowTuple {
    /// A whole record in one tuple
    pub fn new(row_index: u32, partitions: Vec<BigUint>) -> Self {
        Self {
            row_index,
            partitions,
            part: 0,
            parts: 1,
        }
    }

    /// Element `part` of a record split into `parts` tuples
    pub fn split_part(row_index: u32, partition: BigUint, part: u32, parts: u32) -> Self {
        Self {
            row_index,
            partitions: vec![partition],
            part,
            parts,
        }
    }

    /// First tuple of its record
    pub fn starts_record(&self) -> bool {
        self.part == 0
    }

    /// Tuples of the same record still to come after this one
    pub fn remaining_parts(&self) -> u32 {
        self.parts.saturating_sub(self.part + 1)
    }
}

/// One encrypted contribution to the result matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixElement {
    pub column_index: u64,
    pub encrypted_value: BigUint,
    pub salt: Option<u32>,
}

impl MatrixElement {
    pub fn new(column_index: u64, encrypted_value: BigUint) -> Self {
        Self {
            column_index,
            encrypted_value,
            salt: None,
        }
    }

    pub fn with_salt(mut self, salt: u32) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Data-channel JSON form; the value is a decimal string
    pub fn to_json(&self) -> Value {
        json!({
            "column": self.column_index,
            "value": self.encrypted_value.to_str_radix(10),
            "salt": self.salt,
        })
    }
}

/// Flush token broadcast to every downstream instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlushSignal {
    /// Accumulator instance that opened the epoch
    pub source: u32,
    pub epoch: u64,
}

/// Acknowledgment from one downstream instance that it flushed `epoch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionEnd {
    pub source: u32,
    pub epoch: u64,
    pub downstream: u32,
}

impl SessionEnd {
    /// The session-end answering `signal` from downstream instance `downstream`
    pub fn answering(signal: FlushSignal, downstream: u32) -> Self {
        Self {
            source: signal.source,
            epoch: signal.epoch,
            downstream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_element_json() {
        let element = MatrixElement::new(7, BigUint::from(123456789u64)).with_salt(2);
        let value = element.to_json();
        assert_eq!(value["column"], 7);
        assert_eq!(value["value"], "123456789");
        assert_eq!(value["salt"], 2);

        let unsalted = MatrixElement::new(0, BigUint::from(1u32)).to_json();
        assert!(unsalted["salt"].is_null());
    }

    #[test]
    fn test_session_end_answers_signal() {
        let signal = FlushSignal { source: 4, epoch: 9 };
        let ack = SessionEnd::answering(signal, 2);
        assert_eq!(ack, SessionEnd { source: 4, epoch: 9, downstream: 2 });
    }
}
