//! Error types for mqtt2influx
//!
//! This module defines the error types used throughout the application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Topic pattern and token rule errors
#[derive(Error, Debug)]
pub enum PatternError {
    /// The pattern does not compile into a matcher
    #[error("Invalid topic pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A token rule is not a valid regex
    #[error("Invalid rule '{rule}' for token '{token}': {source}")]
    InvalidValidator {
        token: String,
        rule: String,
        #[source]
        source: regex::Error,
    },
}

/// Payload conversion errors
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Explicit type is not one of int, float, bool, string, json
    #[error("Invalid type '{0}'")]
    UnknownType(String),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),

    #[error("Cannot convert '{value}' to int: {source}")]
    InvalidInt {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Cannot convert '{value}' to float: {source}")]
    InvalidFloat {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("Cannot convert '{0}' to bool")]
    InvalidBool(String),

    /// `type: json` without a `json` path
    #[error("Type 'json' requires a json path")]
    MissingJsonPath,

    /// A path segment did not resolve
    #[error("JSON path '{path}' does not resolve at segment '{segment}'")]
    JsonPath { path: String, segment: String },
}

/// Record construction errors for a single (message, rule) pair
#[derive(Error, Debug)]
pub enum RecordError {
    /// Payload could not be coerced
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// `field_map` / `tag_map` has no entry for the captured value
    #[error("No {map} entry for token '{token}' value '{value}'")]
    MapLookup {
        map: &'static str,
        token: String,
        value: String,
    },
}

/// Record sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// HTTP client could not be built
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// Non-success response status
    #[error("HTTP error status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Base URL or write endpoint does not parse
    #[error("Invalid InfluxDB URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Write timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Record has no measurement and cannot be encoded
    #[error("Record has no measurement")]
    MissingMeasurement,

    /// Line protocol needs at least one field
    #[error("Record for measurement '{0}' has no fields")]
    NoFields(String),

    /// Retries exhausted without a recorded error
    #[error("Maximum retries exceeded")]
    MaxRetriesExceeded,
}

impl SinkError {
    /// Whether the write may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SinkError::HttpRequest(_)
                | SinkError::Timeout
                | SinkError::ConnectionFailed(_)
                | SinkError::HttpStatus {
                    status: 500..=599,
                    ..
                }
        )
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SinkError::Timeout
        } else if err.is_connect() {
            SinkError::ConnectionFailed(err.to_string())
        } else {
            SinkError::HttpRequest(err)
        }
    }
}

/// Message source errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Topic arrived without the configured prefix
    #[error("Received topic '{topic}' does not contain prefix '{prefix}'")]
    MissingPrefix { topic: String, prefix: String },

    /// Subscription filter is not a valid MQTT filter
    #[error("Invalid subscription filter '{0}'")]
    InvalidFilter(String),

    /// Consumer side of the queue is gone
    #[error("Message queue is closed")]
    QueueClosed,
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Message source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, public_message, log_message) = match self {
            AppError::Source(e @ SourceError::MissingPrefix { .. }) => {
                (StatusCode::BAD_REQUEST, "Topic outside prefix", e.to_string())
            }
            AppError::Source(e @ SourceError::InvalidFilter(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid filter", e.to_string())
            }
            AppError::Source(e @ SourceError::QueueClosed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Shutting down",
                e.to_string(),
            ),
        };

        tracing::error!(status = %status, error = %log_message, "Request failed");

        (status, public_message).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_retryable() {
        assert!(SinkError::Timeout.is_retryable());
        assert!(SinkError::ConnectionFailed("refused".to_string()).is_retryable());
        assert!(SinkError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!SinkError::HttpStatus {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!SinkError::MissingMeasurement.is_retryable());
    }

    #[test]
    fn test_missing_prefix_is_bad_request() {
        let err = AppError::Source(SourceError::MissingPrefix {
            topic: "other/a".to_string(),
            prefix: "home/".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_closed_queue_is_unavailable() {
        let err = AppError::from(SourceError::QueueClosed);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_map_lookup_message() {
        let err = RecordError::MapLookup {
            map: "tag_map",
            token: "room".to_string(),
            value: "attic".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No tag_map entry for token 'room' value 'attic'"
        );
    }
}
