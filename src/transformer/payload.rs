//! Payload to field value conversion
//!
//! Coerces a raw payload string into a typed [`FieldValue`]. With no explicit
//! type the value is inferred: numeric-leading text becomes a float,
//! `true`/`false` (any case) a bool, anything else a string.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::record::FieldValue;
use crate::error::ConversionError;

static NUMERIC_LEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)").expect("invalid numeric regex"));

/// Explicit payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Int,
    Float,
    Bool,
    String,
    /// Parse as JSON and extract a nested value by path
    Json,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Int => "int",
            PayloadType::Float => "float",
            PayloadType::Bool => "bool",
            PayloadType::String => "string",
            PayloadType::Json => "json",
        }
    }
}

impl FromStr for PayloadType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" => Ok(PayloadType::Int),
            "float" => Ok(PayloadType::Float),
            "bool" => Ok(PayloadType::Bool),
            "string" => Ok(PayloadType::String),
            "json" => Ok(PayloadType::Json),
            _ => Err(ConversionError::UnknownType(s.to_string())),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload converter
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadConverter;

impl PayloadConverter {
    pub fn new() -> Self {
        Self
    }

    /// Decode payload bytes as UTF-8
    pub fn decode(&self, payload: &[u8]) -> Result<String, ConversionError> {
        String::from_utf8(payload.to_vec()).map_err(ConversionError::InvalidUtf8)
    }

    /// Convert a raw payload using a type name from configuration
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::UnknownType` for a type name that is not one
    /// of `int`, `float`, `bool`, `string`, `json`, and the corresponding
    /// parse error when the payload does not fit the type.
    pub fn convert(
        &self,
        raw: &str,
        type_name: Option<&str>,
        json_path: Option<&str>,
    ) -> Result<FieldValue, ConversionError> {
        let payload_type = type_name.map(PayloadType::from_str).transpose()?;
        self.convert_typed(raw, payload_type, json_path)
    }

    /// Convert a raw payload with an already-parsed type
    pub fn convert_typed(
        &self,
        raw: &str,
        payload_type: Option<PayloadType>,
        json_path: Option<&str>,
    ) -> Result<FieldValue, ConversionError> {
        match payload_type {
            None => self.infer(raw),
            Some(PayloadType::Int) => {
                let trimmed = raw.trim();
                trimmed
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|e| ConversionError::InvalidInt {
                        value: raw.to_string(),
                        source: e,
                    })
            }
            Some(PayloadType::Float) => parse_float(raw),
            Some(PayloadType::Bool) => parse_bool(raw),
            Some(PayloadType::String) => Ok(FieldValue::String(raw.to_string())),
            Some(PayloadType::Json) => {
                let path = json_path.ok_or(ConversionError::MissingJsonPath)?;
                let document: Value = match serde_json::from_str(raw) {
                    Ok(document) => document,
                    Err(e) => {
                        tracing::debug!(error = %e, "Payload is not JSON, using raw string");
                        return Ok(FieldValue::String(raw.to_string()));
                    }
                };
                let leaf = resolve_path(&document, path)?;
                Ok(FieldValue::String(json_to_string(leaf)))
            }
        }
    }

    /// Infer a value type from the payload text
    pub fn infer(&self, raw: &str) -> Result<FieldValue, ConversionError> {
        if NUMERIC_LEADING.is_match(raw) {
            parse_float(raw)
        } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
            parse_bool(raw)
        } else {
            Ok(FieldValue::String(raw.to_string()))
        }
    }

    /// Extract a value from a parsed JSON document
    ///
    /// Without an explicit type the JSON type of the leaf is kept (numbers
    /// become integers when they fit, otherwise floats). With a type the
    /// leaf is stringified and converted.
    pub fn extract(
        &self,
        document: &Value,
        path: &str,
        payload_type: Option<PayloadType>,
    ) -> Result<FieldValue, ConversionError> {
        let leaf = resolve_path(document, path)?;

        match payload_type {
            None => Ok(match leaf {
                Value::Bool(b) => FieldValue::Boolean(*b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => FieldValue::Integer(i),
                    None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                other => FieldValue::String(json_to_string(other)),
            }),
            Some(PayloadType::Json) => Ok(FieldValue::String(json_to_string(leaf))),
            Some(other) => self.convert_typed(&json_to_string(leaf), Some(other), None),
        }
    }
}

/// Walk a comma-separated path of object keys and array indices
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Result<&'a Value, ConversionError> {
    let mut current = document;

    for segment in path.split(',') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };

        current = next.ok_or_else(|| ConversionError::JsonPath {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }

    Ok(current)
}

/// Strings render verbatim, everything else as JSON text
fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_float(raw: &str) -> Result<FieldValue, ConversionError> {
    raw.trim()
        .parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|e| ConversionError::InvalidFloat {
            value: raw.to_string(),
            source: e,
        })
}

fn parse_bool(raw: &str) -> Result<FieldValue, ConversionError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(FieldValue::Boolean(true)),
        "false" | "0" => Ok(FieldValue::Boolean(false)),
        _ => Err(ConversionError::InvalidBool(raw.to_string())),
    }
}
