//! CLI argument parsing for mqtt2influx
//!
//! This module provides the command-line interface using clap derive macros.
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: MQTT2INFLUX_CONFIG)
//! - `--port` / `-p`: Ingest server port (overrides config file, env: MQTT2INFLUX_PORT)
//! - `--bind-address`: Server bind address (env: MQTT2INFLUX_BIND_ADDRESS)
//! - `--prefix`: Topic prefix (env: MQTT2INFLUX_PREFIX)
//! - `--influx-url`: InfluxDB URL (env: MQTT2INFLUX_INFLUX_URL)
//! - `--database`: InfluxDB database (env: MQTT2INFLUX_DATABASE)
//! - `--validate`: Validate configuration without starting server
//! - `--dry-run`: Show subscriptions and parsed rules
//! - `--log-level` / `-l`: Log level (trace/debug/info/warn/error, env: MQTT2INFLUX_LOG_LEVEL)
//! - `--log-format`: Log line format (text/json, env: MQTT2INFLUX_LOG_FORMAT)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//!
//! # Precedence
//!
//! Configuration values are resolved in the following order (highest to lowest priority):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, ConfigError, InfluxConfig};

/// mqtt2influx - rule-driven topic message to InfluxDB bridge
///
/// Matches published messages against topic rules and writes the
/// resulting records to InfluxDB.
///
/// Environment variables can be used for all configuration options.
/// CLI arguments take precedence over environment variables,
/// which take precedence over config file values.
#[derive(Parser, Debug)]
#[command(name = "mqtt2influx")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "MQTT2INFLUX_CONFIG"
    )]
    pub config: PathBuf,

    /// Ingest server port (overrides config file)
    #[arg(short, long, value_name = "PORT", env = "MQTT2INFLUX_PORT")]
    pub port: Option<u16>,

    /// Server bind address (overrides config file)
    /// Supported values: IP addresses (0.0.0.0, 127.0.0.1, ::1) or "localhost"
    #[arg(long, value_name = "ADDRESS", env = "MQTT2INFLUX_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Topic prefix stripped from inbound topics (overrides config file)
    #[arg(long, value_name = "PREFIX", env = "MQTT2INFLUX_PREFIX")]
    pub prefix: Option<String>,

    /// InfluxDB URL (overrides config file)
    #[arg(long, value_name = "URL", env = "MQTT2INFLUX_INFLUX_URL")]
    pub influx_url: Option<String>,

    /// InfluxDB database (overrides config file)
    #[arg(long, value_name = "NAME", env = "MQTT2INFLUX_DATABASE")]
    pub database: Option<String>,

    /// Validate configuration without starting server
    #[arg(long)]
    pub validate: bool,

    /// Show subscriptions and parsed rules without starting server
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "MQTT2INFLUX_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", env = "MQTT2INFLUX_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

impl Cli {
    /// Apply command-line overrides to a loaded configuration
    ///
    /// # Errors
    /// Returns an error if an InfluxDB URL is given without any database,
    /// or if the resulting configuration is invalid
    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind_address) = &self.bind_address {
            config.server.bind_address = bind_address.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.mqtt.prefix = prefix.clone();
        }

        if let Some(influx) = config.influxdb.as_mut() {
            if let Some(url) = &self.influx_url {
                influx.url = url.clone();
            }
            if let Some(database) = &self.database {
                influx.database = database.clone();
            }
        } else if let Some(database) = &self.database {
            config.influxdb = Some(InfluxConfig {
                url: self
                    .influx_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:8086".to_string()),
                database: database.clone(),
                username: None,
                password: None,
                timeout_ms: 5000,
                max_retries: 3,
            });
        } else if self.influx_url.is_some() {
            return Err(ConfigError::ValidationError(
                "--influx-url requires --database when the config has no influxdb section"
                    .to_string(),
            ));
        }

        config.validate()
    }
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log line format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}
