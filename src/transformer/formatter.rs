//! InfluxDB line protocol output
//!
//! # Format
//!
//! ```text
//! <measurement>[,<tag_key>=<tag_value>...] <field_key>=<field_value>[,...] [<timestamp>]
//! ```
//!
//! Integers carry an `i` suffix, strings are double-quoted. Tags and fields
//! are written in key order.

use std::time::{SystemTime, UNIX_EPOCH};

use super::record::{FieldValue, WriteRecord};
use crate::error::SinkError;

/// Line protocol formatter
///
/// # Example
///
/// ```ignore
/// use mqtt2influx::transformer::{LineProtocolFormatter, WriteRecord};
///
/// let record = WriteRecord::new()
///     .with_measurement("temperature")
///     .with_tag("room", "kitchen")
///     .with_field("value", 21.5);
///
/// let line = LineProtocolFormatter::new().format(&record)?;
/// assert_eq!(line, "temperature,room=kitchen value=21.5");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LineProtocolFormatter {
    /// Append a nanosecond timestamp; the server assigns one otherwise
    include_timestamp: bool,
}

impl LineProtocolFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to include timestamps in output
    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }

    /// Format one record as a single line
    ///
    /// Tags with empty values and non-finite floats are left out, since the
    /// server rejects them.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::MissingMeasurement` or `SinkError::NoFields` when
    /// the record cannot be represented.
    pub fn format(&self, record: &WriteRecord) -> Result<String, SinkError> {
        let measurement = record
            .measurement
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or(SinkError::MissingMeasurement)?;

        let mut line = escape_measurement(measurement);

        for (key, value) in record.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        let fields: Vec<String> = record
            .fields
            .iter()
            .filter(|(_, value)| !matches!(value, FieldValue::Float(f) if !f.is_finite()))
            .map(|(key, value)| format!("{}={}", escape_key(key), format_field_value(value)))
            .collect();

        if fields.is_empty() {
            return Err(SinkError::NoFields(measurement.to_string()));
        }

        line.push(' ');
        line.push_str(&fields.join(","));

        if self.include_timestamp {
            line.push(' ');
            line.push_str(&timestamp_nanos().to_string());
        }

        Ok(line)
    }

    /// Format several records, one per line
    pub fn format_batch(&self, records: &[WriteRecord]) -> Result<String, SinkError> {
        let lines = records
            .iter()
            .map(|record| self.format(record))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }
}

fn format_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Integer(v) => format!("{}i", v),
        FieldValue::Boolean(v) => v.to_string(),
        FieldValue::String(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        }
    }
}

/// Commas and spaces
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Commas, equals signs and spaces; used for tag keys, tag values and field keys
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn timestamp_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_simple() {
        let record = WriteRecord::new()
            .with_measurement("temperature")
            .with_tag("room", "kitchen")
            .with_field("value", 21.5);

        let line = LineProtocolFormatter::new().format(&record).unwrap();
        assert_eq!(line, "temperature,room=kitchen value=21.5");
    }

    #[test]
    fn test_field_types() {
        let record = WriteRecord::new()
            .with_measurement("m")
            .with_field("b", true)
            .with_field("f", 2.0)
            .with_field("i", 42i64)
            .with_field("s", "say \"hi\"");

        let line = LineProtocolFormatter::new().format(&record).unwrap();
        assert_eq!(line, r#"m b=true,f=2,i=42i,s="say \"hi\"""#);
    }

    #[test]
    fn test_escaping() {
        let record = WriteRecord::new()
            .with_measurement("my measurement,x")
            .with_tag("tag key", "a=b,c")
            .with_field("field key", 1i64);

        let line = LineProtocolFormatter::new().format(&record).unwrap();
        assert_eq!(
            line,
            r"my\ measurement\,x,tag\ key=a\=b\,c field\ key=1i"
        );
    }

    #[test]
    fn test_tags_sorted_and_empty_tags_dropped() {
        let record = WriteRecord::new()
            .with_measurement("m")
            .with_tag("z", "1")
            .with_tag("a", "2")
            .with_tag("empty", "")
            .with_field("v", 1i64);

        let line = LineProtocolFormatter::new().format(&record).unwrap();
        assert_eq!(line, "m,a=2,z=1 v=1i");
    }

    #[test]
    fn test_missing_measurement() {
        let record = WriteRecord::new().with_field("v", 1i64);
        let result = LineProtocolFormatter::new().format(&record);
        assert!(matches!(result, Err(SinkError::MissingMeasurement)));
    }

    #[test]
    fn test_no_fields() {
        let record = WriteRecord::new()
            .with_measurement("m")
            .with_field("nan", f64::NAN);
        let result = LineProtocolFormatter::new().format(&record);
        assert!(matches!(result, Err(SinkError::NoFields(m)) if m == "m"));
    }

    #[test]
    fn test_timestamp() {
        let record = WriteRecord::new().with_measurement("m").with_field("v", 1i64);
        let line = LineProtocolFormatter::new()
            .with_timestamps(true)
            .format(&record)
            .unwrap();

        let parts: Vec<&str> = line.split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].parse::<u128>().unwrap() > 0);
    }

    #[test]
    fn test_format_batch() {
        let records = vec![
            WriteRecord::new().with_measurement("a").with_field("v", 1i64),
            WriteRecord::new().with_measurement("b").with_field("v", 2i64),
        ];
        let output = LineProtocolFormatter::new().format_batch(&records).unwrap();
        assert_eq!(output, "a v=1i\nb v=2i");
    }
}
