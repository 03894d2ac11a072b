//! CLI integration tests
//!
//! Tests for the command-line interface using assert_cmd.
//!
//! These tests verify:
//! - Help and version flags
//! - Configuration validation
//! - Dry run mode
//! - Error handling for missing files

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

const VALID_CONFIG: &str = r#"
mqtt:
  prefix: site

server:
  port: 9100
  bind_address: "127.0.0.1"

rules:
  - topic: "home/+room/temperature"
    measurement: temperature
    payload:
      field: true
      type: float
    tokens:
      room:
        tag: true
"#;

/// Get a command for the mqtt2influx binary
#[allow(deprecated)]
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("mqtt2influx").expect("Failed to find mqtt2influx binary");
    for var in [
        "MQTT2INFLUX_CONFIG",
        "MQTT2INFLUX_PORT",
        "MQTT2INFLUX_BIND_ADDRESS",
        "MQTT2INFLUX_PREFIX",
        "MQTT2INFLUX_INFLUX_URL",
        "MQTT2INFLUX_DATABASE",
        "MQTT2INFLUX_LOG_LEVEL",
        "MQTT2INFLUX_LOG_FORMAT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Helper to create a temporary config file with given content
fn create_temp_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file.flush().expect("Failed to flush");
    file
}

/// Test --help flag displays usage information
#[test]
fn test_help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:").or(predicate::str::contains("usage:")))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--dry-run"));
}

/// Test -h short flag also works
#[test]
fn test_help_short_flag() {
    cmd()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("mqtt2influx"));
}

/// Test --version flag displays version
#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// --validate
// ============================================================================

#[test]
fn test_validate_valid_config() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("1 valid"));
}

#[test]
fn test_validate_counts_skipped_rules() {
    let file = create_temp_config(
        r#"
rules:
  - topic: "a/+x"
  - measurement: no_topic
  - topic: "b/+y"
    tokens:
      y:
        rule: "("
"#,
    );

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Configuration is valid: 3 rules (1 valid, 2 skipped)",
        ));
}

#[test]
fn test_json_logs_go_to_stderr() {
    let file = create_temp_config("rules:\n  - measurement: no_topic\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .args(["--validate", "--log-format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Configuration is valid: 1 rules (0 valid, 1 skipped)",
        ))
        .stderr(predicate::str::contains(r#""level":"ERROR""#))
        .stderr(predicate::str::contains("Skipping rule"));
}

#[test]
fn test_validate_json_output() {
    let file = create_temp_config(VALID_CONFIG);

    let output = cmd()
        .arg("-c")
        .arg(file.path())
        .args(["--validate", "--output-format", "json"])
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(report["valid_rules"], 1);
    assert_eq!(report["prefix"], "site/");
    assert_eq!(report["subscriptions"][0], "site/home/+/temperature");
}

#[test]
fn test_missing_config_file() {
    cmd()
        .arg("-c")
        .arg("/nonexistent/config.yaml")
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}

#[test]
fn test_invalid_yaml() {
    let file = create_temp_config("rules: [unclosed\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

#[test]
fn test_missing_rules_section() {
    let file = create_temp_config("mqtt:\n  prefix: site\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rules"));
}

#[test]
fn test_invalid_port_in_config() {
    let file = create_temp_config("server:\n  port: 0\nrules: []\n");

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

// ============================================================================
// Overrides
// ============================================================================

#[test]
fn test_port_override_is_validated() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .args(["-p", "0", "--validate"])
        .assert()
        .failure();
}

#[test]
fn test_influx_url_requires_database() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .args(["--influx-url", "http://influx:8086", "--validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--database"));
}

#[test]
fn test_env_overrides_prefix() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .env("MQTT2INFLUX_PREFIX", "plant")
        .assert()
        .success()
        .stdout(predicate::str::contains("plant/home/+/temperature"));
}

#[test]
fn test_env_config_path() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("--validate")
        .env("MQTT2INFLUX_CONFIG", file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

// ============================================================================
// --dry-run
// ============================================================================

#[test]
fn test_dry_run_lists_rules() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sink: log"))
        .stdout(predicate::str::contains("site/home/+/temperature"))
        .stdout(predicate::str::contains(
            "home/+room/temperature -> measurement=temperature captures=[room]",
        ))
        .stdout(predicate::str::contains("Dry run completed"))
        .stdout(predicate::str::contains("1 valid"));
}

#[test]
fn test_dry_run_with_database_uses_influx_sink() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .args(["--dry-run", "--database", "home"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Sink: influxdb http://localhost:8086 (db=home)",
        ));
}

#[test]
fn test_dry_run_omits_malformed_subscriptions() {
    let file = create_temp_config(
        r#"
rules:
  - topic: "a/#x/b"
    measurement: malformed
  - topic: "a/+x"
    measurement: fine
"#,
    );

    cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("a/+"))
        .stdout(predicate::str::contains("a/#/b").not())
        .stdout(predicate::str::contains("2 rules (1 valid, 1 skipped)"));
}

#[test]
fn test_dry_run_yaml_output() {
    let file = create_temp_config(VALID_CONFIG);

    cmd()
        .arg("-c")
        .arg(file.path())
        .args(["--dry-run", "--output-format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid_rules: 1"))
        .stdout(predicate::str::contains("Dry run completed").not());
}
