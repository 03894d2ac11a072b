//! Configuration management for mqtt2influx
//!
//! Handles loading and validating configuration from YAML files. The rule
//! schema is deserialized into the `*Config` types here and compiled into
//! [`crate::transformer::RuleSet`] once at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transformer::FieldValue;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The `rules` section is absent
    #[error("No configuration section for rules")]
    MissingRules,

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Message source settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// InfluxDB sink settings; records are only logged when absent
    #[serde(default)]
    pub influxdb: Option<InfluxConfig>,

    /// HTTP ingest server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Consumer settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Topic rules
    #[serde(default)]
    pub rules: Option<Vec<RuleConfig>>,
}

/// Message source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Topic prefix stripped from every inbound topic
    #[serde(default)]
    pub prefix: String,
}

/// InfluxDB (v1 HTTP API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB server
    #[serde(default = "default_influx_url")]
    pub url: String,

    /// Target database
    pub database: String,

    /// Optional username for basic auth
    pub username: Option<String>,

    /// Optional password for basic auth
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Retries for transient write failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Queue consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum queued messages before producers wait
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Literal scalar from configuration (static fields, tags, map outputs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    /// Typed field value, keeping the YAML scalar type
    pub fn to_field_value(&self) -> FieldValue {
        match self {
            ConfigValue::Bool(b) => FieldValue::Boolean(*b),
            ConfigValue::Integer(i) => FieldValue::Integer(*i),
            ConfigValue::Float(f) => FieldValue::Float(*f),
            ConfigValue::String(s) => FieldValue::String(s.clone()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Integer(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(s) => f.write_str(s),
        }
    }
}

/// One entry of the `rules` list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Topic pattern (`literal`, `+name`, `#name` segments)
    pub topic: Option<String>,

    /// Accept retained messages
    #[serde(default)]
    pub retain: bool,

    /// Build records but never hand them to the sink
    #[serde(default)]
    pub disable_write: bool,

    /// Literal measurement name
    #[serde(default)]
    pub measurement: Option<ConfigValue>,

    /// Payload handling
    #[serde(default)]
    pub payload: Option<PayloadRuleConfig>,

    /// Static fields
    #[serde(default)]
    pub fields: Option<BTreeMap<String, ConfigValue>>,

    /// Static tags
    #[serde(default)]
    pub tags: Option<BTreeMap<String, ConfigValue>>,

    /// Per-capture configuration keyed by token name
    #[serde(default)]
    pub tokens: Option<BTreeMap<String, TokenRuleConfig>>,
}

/// Payload section of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRuleConfig {
    /// Field name for the payload value
    #[serde(default = "default_payload_name")]
    pub name: String,

    /// Store the payload as a field
    #[serde(default)]
    pub field: bool,

    /// Explicit type: int, float, bool, string or json
    #[serde(rename = "type", default)]
    pub payload_type: Option<String>,

    /// Comma-separated path, used with `type: json`
    #[serde(default)]
    pub json: Option<String>,

    /// Additional fields extracted from a JSON payload
    #[serde(default)]
    pub extract: BTreeMap<String, ExtractRuleConfig>,
}

/// JSON extraction of one field from the payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRuleConfig {
    /// Comma-separated path of keys and indices
    pub json: String,

    /// Optional type for the extracted leaf
    #[serde(rename = "type", default)]
    pub payload_type: Option<String>,
}

/// Token section of a rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRuleConfig {
    /// Regex the captured segment must satisfy
    #[serde(default)]
    pub rule: Option<String>,

    #[serde(default)]
    pub field_name: Option<String>,

    #[serde(default)]
    pub tag_name: Option<String>,

    /// Store the capture as a field
    #[serde(default)]
    pub field: bool,

    /// Store the capture as a tag
    #[serde(default)]
    pub tag: bool,

    /// Use the capture as measurement
    #[serde(default)]
    pub measurement: bool,

    #[serde(default)]
    pub field_map: BTreeMap<String, ConfigValue>,

    #[serde(default)]
    pub tag_map: BTreeMap<String, ConfigValue>,
}

// Default value functions
fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_port() -> u16 {
    9100
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_payload_name() -> String {
    "payload".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl MqttConfig {
    /// Prefix with a trailing `/`, or empty
    pub fn normalized_prefix(&self) -> String {
        if self.prefix.is_empty() || self.prefix.ends_with('/') {
            self.prefix.clone()
        } else {
            format!("{}/", self.prefix)
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the
    /// `rules` section is missing
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The configured rules
    pub fn rules(&self) -> &[RuleConfig] {
        self.rules.as_deref().unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.is_none() {
            return Err(ConfigError::MissingRules);
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(influx) = &self.influxdb {
            url::Url::parse(&influx.url).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid InfluxDB url '{}': {}",
                    influx.url, e
                ))
            })?;

            if influx.database.is_empty() {
                return Err(ConfigError::ValidationError(
                    "InfluxDB database must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
