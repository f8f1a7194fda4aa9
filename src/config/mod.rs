//! Responder configuration
//!
//! Loaded once at startup from a JSON file, immutable afterwards.
//! Keys are camelCase; time-based values are in seconds.

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

/// Largest supported `hashBitSize`; the query element table has `2^n` rows.
pub const MAX_HASH_BIT_SIZE: u32 = 24;

/// Top-level configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Seconds between flush epochs
    #[serde(default = "default_time_to_flush")]
    pub time_to_flush: u64,

    /// Whether the per-row hit cap is enforced
    #[serde(default)]
    pub limit_hits_per_selector: bool,

    /// Per-row hit cap within one epoch
    #[serde(default = "default_max_hits_per_selector")]
    pub max_hits_per_selector: u64,

    /// Downstream aggregation parallelism (P), the expected ack count
    pub downstream_parallelism: u32,

    /// Tag emitted elements with a random salt bucket
    #[serde(default)]
    pub salt_columns: bool,

    /// Salt range bound, salts are drawn from `[0, rowDivisions)`
    #[serde(default = "default_row_divisions")]
    pub row_divisions: u32,

    /// Partitioner emits one tuple per partition element
    #[serde(default)]
    pub split_partitions: bool,

    /// Number of parallel accumulator instances
    #[serde(default = "default_accumulator_instances")]
    pub accumulator_instances: u32,

    /// Seconds a flush epoch may wait for its acks. `null` waits forever.
    #[serde(default = "default_ack_deadline")]
    pub ack_deadline: Option<u64>,

    /// Buffered element count that triggers a warning
    #[serde(default = "default_buffer_warn_threshold")]
    pub buffer_warn_threshold: usize,

    /// Minimum log severity
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Query parameters for the encryption primitive
    pub query: QueryConfig,
}

/// Query parameters, the fields needed to build the shared query context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Key mixed into the selector hash
    pub hash_key: String,

    /// Row index width in bits
    pub hash_bit_size: u32,

    /// Partition width in bits (multiple of 8)
    #[serde(default = "default_data_partition_bit_size")]
    pub data_partition_bit_size: u32,

    /// Record field holding the selector
    pub selector_field: String,

    /// Record fields forming the payload, in order
    pub data_fields: Vec<String>,

    /// Decimal modulus `N`
    pub modulus: String,

    /// Decimal query elements, one per row
    pub query_elements: Vec<String>,
}

fn default_time_to_flush() -> u64 {
    60
}
fn default_max_hits_per_selector() -> u64 {
    1000
}
fn default_row_divisions() -> u32 {
    1
}
fn default_accumulator_instances() -> u32 {
    1
}
fn default_ack_deadline() -> Option<u64> {
    Some(300)
}
fn default_buffer_warn_threshold() -> usize {
    1_000_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_partition_bit_size() -> u32 {
    8
}

impl ResponderConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: ResponderConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.time_to_flush == 0 {
            return Err(ConfigError::invalid("timeToFlush must be > 0"));
        }
        if self.downstream_parallelism == 0 {
            return Err(ConfigError::invalid("downstreamParallelism must be > 0"));
        }
        if self.accumulator_instances == 0 {
            return Err(ConfigError::invalid("accumulatorInstances must be > 0"));
        }
        if self.salt_columns && self.row_divisions == 0 {
            return Err(ConfigError::invalid(
                "rowDivisions must be > 0 when saltColumns is enabled",
            ));
        }
        if self.limit_hits_per_selector && self.max_hits_per_selector == 0 {
            return Err(ConfigError::invalid(
                "maxHitsPerSelector must be > 0 when limitHitsPerSelector is enabled",
            ));
        }
        if self.ack_deadline == Some(0) {
            return Err(ConfigError::invalid("ackDeadline must be > 0 or null"));
        }
        self.log_severity()?;
        self.query.validate()
    }

    pub fn time_to_flush_duration(&self) -> Duration {
        Duration::from_secs(self.time_to_flush)
    }

    pub fn ack_deadline_duration(&self) -> Option<Duration> {
        self.ack_deadline.map(Duration::from_secs)
    }

    /// Parsed `logLevel`
    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse::<Severity>().map_err(ConfigError::Invalid)
    }
}

impl QueryConfig {
    /// Number of rows addressed by the selector hash
    pub fn row_count(&self) -> usize {
        1usize << self.hash_bit_size
    }

    /// Validate shape only. Numeric content is checked when the query
    /// context is built.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.hash_bit_size == 0 || self.hash_bit_size > MAX_HASH_BIT_SIZE {
            return Err(ConfigError::invalid(format!(
                "query.hashBitSize must be in 1..={}",
                MAX_HASH_BIT_SIZE
            )));
        }
        if self.data_partition_bit_size == 0
            || self.data_partition_bit_size % 8 != 0
            || self.data_partition_bit_size > 64
        {
            return Err(ConfigError::invalid(
                "query.dataPartitionBitSize must be a multiple of 8 in 8..=64",
            ));
        }
        if self.selector_field.is_empty() {
            return Err(ConfigError::invalid("query.selectorField must not be empty"));
        }
        if self.data_fields.is_empty() {
            return Err(ConfigError::invalid("query.dataFields must not be empty"));
        }
        if self.query_elements.len() != self.row_count() {
            return Err(ConfigError::invalid(format!(
                "query.queryElements has {} entries, expected 2^{} = {}",
                self.query_elements.len(),
                self.hash_bit_size,
                self.row_count()
            )));
        }
        Ok(())
    }
}
