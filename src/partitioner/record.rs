//! Decoded input records

use serde_json::{Map, Value};

use super::errors::{PartitionError, PartitionResult};

/// A decoded key/value document. Consumed once per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Decode one raw record. Must be a JSON object.
    pub fn decode(raw: &str) -> PartitionResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| PartitionError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> PartitionResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(PartitionError::NotAnObject),
        }
    }

    /// Field value, `None` when absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Selector text for `field`: strings verbatim, other scalars as JSON text
    pub fn selector(&self, field: &str) -> PartitionResult<String> {
        match self.get(field) {
            None | Some(Value::Null) => Err(PartitionError::MissingField(field.to_string())),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object() {
        let record = Record::decode(r#"{"sel": "alice", "n": 4}"#).unwrap();
        assert_eq!(record.selector("sel").unwrap(), "alice");
        assert_eq!(record.selector("n").unwrap(), "4");
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(Record::decode("[1,2]"), Err(PartitionError::NotAnObject)));
        assert!(matches!(Record::decode("{oops"), Err(PartitionError::Parse(_))));
    }

    #[test]
    fn test_null_selector_is_missing() {
        let record = Record::decode(r#"{"sel": null}"#).unwrap();
        assert_eq!(
            record.selector("sel"),
            Err(PartitionError::MissingField("sel".into()))
        );
    }
}
