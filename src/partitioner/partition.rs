//! Payload partitioning
//!
//! Each configured data field is turned into bytes and cut into fixed-width
//! big-endian chunks. A short final chunk is zero-padded on the right.

use num_bigint::BigUint;
use serde_json::Value;

use super::errors::{PartitionError, PartitionResult};
use super::record::Record;
use crate::query::QueryInfo;

/// Byte form of one field value
pub fn field_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => Vec::new(),
        Value::Bool(b) => vec![u8::from(*b)],
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.to_be_bytes().to_vec()
            } else if let Some(i) = n.as_i64() {
                i.to_be_bytes().to_vec()
            } else {
                n.as_f64().unwrap_or_default().to_bits().to_be_bytes().to_vec()
            }
        }
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Array(items) => items.iter().flat_map(field_bytes).collect(),
        Value::Object(_) => value.to_string().into_bytes(),
    }
}

/// Cut `bytes` into `width`-byte partitions. Empty input yields one zero
/// partition so every field occupies at least one column.
pub fn partition_bytes(bytes: &[u8], width: usize) -> Vec<BigUint> {
    if bytes.is_empty() {
        return vec![BigUint::default()];
    }

    bytes
        .chunks(width)
        .map(|chunk| {
            if chunk.len() == width {
                BigUint::from_bytes_be(chunk)
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(width, 0);
                BigUint::from_bytes_be(&padded)
            }
        })
        .collect()
}

/// Partition sequence for a record: all data fields, in configured order
pub fn partition_record(record: &Record, info: &QueryInfo) -> PartitionResult<Vec<BigUint>> {
    let width = info.partition_bytes().max(1);
    let mut partitions = Vec::new();

    for field in &info.data_fields {
        let value = record
            .get(field)
            .ok_or_else(|| PartitionError::MissingField(field.clone()))?;
        partitions.extend(partition_bytes(&field_bytes(value), width));
    }

    Ok(partitions)
}
