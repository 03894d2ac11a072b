//! Write records produced by the rule engine

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value that can be stored in a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// Structured output unit handed to a record sink
///
/// Keys are kept sorted so the encoded form is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Measurement name, unset when neither the rule nor a token supplied one
    pub measurement: Option<String>,
    /// Field set
    pub fields: BTreeMap<String, FieldValue>,
    /// Tag set
    pub tags: BTreeMap<String, String>,
}

impl WriteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the measurement
    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = Some(measurement.into());
        self
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Float(21.5).to_string(), "21.5");
        assert_eq!(FieldValue::Integer(42).to_string(), "42");
        assert_eq!(FieldValue::Boolean(true).to_string(), "true");
        assert_eq!(FieldValue::from("on").to_string(), "on");
    }

    #[test]
    fn test_record_builder() {
        let record = WriteRecord::new()
            .with_measurement("temperature")
            .with_field("value", 21.5)
            .with_tag("room", "kitchen");

        assert_eq!(record.measurement.as_deref(), Some("temperature"));
        assert_eq!(record.fields.get("value"), Some(&FieldValue::Float(21.5)));
        assert_eq!(record.tags.get("room"), Some(&"kitchen".to_string()));
    }

    #[test]
    fn test_record_serializes_deterministically() {
        let record = WriteRecord::new()
            .with_measurement("m")
            .with_tag("b", "2")
            .with_tag("a", "1");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"measurement":"m","fields":{},"tags":{"a":"1","b":"2"}}"#
        );
    }
}
