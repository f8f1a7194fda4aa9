//! Query info: the non-secret shape of a query

use crate::config::QueryConfig;

/// Parameters the partitioner needs to hash selectors and cut payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub hash_key: String,
    pub hash_bit_size: u32,
    pub data_partition_bit_size: u32,
    pub selector_field: String,
    pub data_fields: Vec<String>,
}

impl QueryInfo {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            hash_key: config.hash_key.clone(),
            hash_bit_size: config.hash_bit_size,
            data_partition_bit_size: config.data_partition_bit_size,
            selector_field: config.selector_field.clone(),
            data_fields: config.data_fields.clone(),
        }
    }

    /// Number of result matrix rows, `2^hash_bit_size`
    pub fn row_count(&self) -> usize {
        1usize << self.hash_bit_size
    }

    /// Bytes per data partition
    pub fn partition_bytes(&self) -> usize {
        (self.data_partition_bit_size / 8) as usize
    }
}
