//! mqtt2influx - rule-driven topic message to InfluxDB bridge
//!
//! This binary runs the ingest server and the rule pipeline, or checks a
//! configuration with `--validate` / `--dry-run`.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use mqtt2influx::{
    cli::{Cli, OutputFormat},
    config::Config,
    server,
    sink::{InfluxSink, LogSink, Sink},
    topic::is_valid_filter,
    transformer::RuleSet,
};

/// One rule as shown by `--dry-run`
#[derive(Serialize)]
struct RuleReport {
    topic: String,
    subscription: String,
    measurement: Option<String>,
    captures: Vec<String>,
    retain: bool,
    disable_write: bool,
}

/// Output of `--validate` and `--dry-run`
#[derive(Serialize)]
struct ConfigReport {
    prefix: String,
    sink: String,
    configured_rules: usize,
    valid_rules: usize,
    skipped_rules: usize,
    subscriptions: Vec<String>,
    rules: Vec<RuleReport>,
}

impl ConfigReport {
    fn new(config: &Config) -> Self {
        let rules = RuleSet::from_config(config.rules());
        let prefix = config.mqtt.normalized_prefix();

        Self {
            sink: match &config.influxdb {
                Some(influx) => format!("influxdb {} (db={})", influx.url, influx.database),
                None => "log".to_string(),
            },
            configured_rules: config.rules().len(),
            valid_rules: rules.len(),
            skipped_rules: config.rules().len() - rules.len(),
            subscriptions: rules
                .subscriptions()
                .filter(|filter| is_valid_filter(filter))
                .map(|filter| format!("{}{}", prefix, filter))
                .collect(),
            rules: rules
                .iter()
                .map(|rule| RuleReport {
                    topic: rule.topic().to_string(),
                    subscription: rule.normalized().to_string(),
                    measurement: rule.measurement.clone(),
                    captures: rule.pattern.capture_names().map(str::to_string).collect(),
                    retain: rule.retain,
                    disable_write: rule.disable_write,
                })
                .collect(),
            prefix,
        }
    }

    fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
            OutputFormat::Text => {
                let mut out = format!("Sink: {}\nSubscriptions:\n", self.sink);
                for filter in &self.subscriptions {
                    out.push_str(&format!("  {}\n", filter));
                }
                out.push_str("Rules:\n");
                for rule in &self.rules {
                    out.push_str(&format!(
                        "  {} -> measurement={} captures=[{}]{}{}\n",
                        rule.topic,
                        rule.measurement.as_deref().unwrap_or("<from token>"),
                        rule.captures.join(", "),
                        if rule.retain { " retain" } else { "" },
                        if rule.disable_write { " disable_write" } else { "" },
                    ));
                }
                out
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    mqtt2influx::init_logging(&cli.log_level.to_string(), cli.log_format)?;

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config file {}", cli.config.display()))?;
    cli.apply_overrides(&mut config)?;

    if cli.validate {
        let report = ConfigReport::new(&config);
        match cli.output_format {
            OutputFormat::Text => println!(
                "Configuration is valid: {} rules ({} valid, {} skipped)",
                report.configured_rules, report.valid_rules, report.skipped_rules
            ),
            format => print!("{}", report.render(format)?),
        }
        return Ok(());
    }

    if cli.dry_run {
        let report = ConfigReport::new(&config);
        print!("{}", report.render(cli.output_format)?);
        if cli.output_format == OutputFormat::Text {
            println!(
                "Dry run completed: {} rules ({} valid, {} skipped)",
                report.configured_rules, report.valid_rules, report.skipped_rules
            );
        }
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mqtt2influx");

    let sink = match &config.influxdb {
        Some(influx) => Sink::Influx(InfluxSink::from_config(influx)?),
        None => {
            warn!("No influxdb section configured, records are only logged");
            Sink::Log(LogSink::new())
        }
    };
    info!(sink = sink.kind(), "Record sink ready");

    server::run(config, sink).await?;

    Ok(())
}
