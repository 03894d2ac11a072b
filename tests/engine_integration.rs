//! Rule engine integration tests
//!
//! Loads rules from YAML the way the binary does and checks the records
//! built for incoming messages.

use mqtt2influx::config::Config;
use mqtt2influx::source::IncomingMessage;
use mqtt2influx::transformer::{
    FieldValue, LineProtocolFormatter, RuleEngine, RuleSet, WriteRecord,
};

const RULES: &str = r#"
rules:
  - topic: "sensors/+room/+kind"
    measurement: environment
    payload:
      field: true
      name: value
    tokens:
      room:
        tag: true
        rule: "(kitchen|hall)$"
      kind:
        tag: true
        tag_name: sensor
    tags:
      site: home
    fields:
      calibrated: true

  - topic: "sensors/+room/+kind"
    retain: true
    payload:
      field: true
      type: int
    tokens:
      kind:
        measurement: true
      room:
        field: true
        field_name: location

  - topic: "switch/+id/state"
    measurement: switches
    payload:
      field: true
      type: bool
    tokens:
      id:
        tag_map:
          "1": lamp
          "2": heater

  - topic: "meter/#path"
    measurement: meter
    payload:
      extract:
        power:
          json: "power"
        phase:
          json: "phases,0"
          type: float
    tokens:
      path:
        tag: true

  - measurement: orphan
"#;

fn engine() -> RuleEngine {
    let config = Config::from_yaml(RULES).unwrap();
    RuleEngine::new(RuleSet::from_config(config.rules()))
}

fn records(engine: &RuleEngine, msg: IncomingMessage) -> Vec<WriteRecord> {
    engine.records(&msg)
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_rules_are_grouped_by_subscription() {
    let engine = engine();
    let rules = engine.rules();

    assert_eq!(rules.len(), 4);
    assert_eq!(
        rules.subscriptions().collect::<Vec<_>>(),
        vec!["sensors/+/+", "switch/+/state", "meter/#"]
    );
    assert_eq!(rules.group("sensors/+/+").unwrap().rules().len(), 2);
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_overlapping_rules_both_fire() {
    let engine = engine();
    let out = records(&engine, IncomingMessage::new("sensors/kitchen/temp", "21"));

    assert_eq!(out.len(), 2);

    let expected_first = WriteRecord::new()
        .with_measurement("environment")
        .with_field("calibrated", true)
        .with_field("value", 21.0)
        .with_tag("room", "kitchen")
        .with_tag("sensor", "temp")
        .with_tag("site", "home");
    assert_eq!(out[0], expected_first);

    let expected_second = WriteRecord::new()
        .with_measurement("temp")
        .with_field("location", "kitchen")
        .with_field("payload", 21i64);
    assert_eq!(out[1], expected_second);
}

#[test]
fn test_retained_messages_only_reach_retain_rules() {
    let engine = engine();
    let out = records(
        &engine,
        IncomingMessage::new("sensors/hall/humidity", "40").with_retain(true),
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].measurement.as_deref(), Some("humidity"));
}

#[test]
fn test_validator_vetoes_only_its_rule() {
    let engine = engine();
    let (dispatched, report) =
        engine.dispatch_with_report(&IncomingMessage::new("sensors/garage/temp", "5"));

    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].rule.measurement, None);
    assert_eq!(dispatched[0].record.measurement.as_deref(), Some("temp"));
    assert_eq!(report.rejected, 1);
}

#[test]
fn test_tag_map_lookup() {
    let engine = engine();
    let out = records(&engine, IncomingMessage::new("switch/2/state", "1"));

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tags["id"], "heater");
    assert_eq!(out[0].fields["payload"], FieldValue::Boolean(true));
}

#[test]
fn test_tag_map_miss_drops_record() {
    let engine = engine();
    let (dispatched, report) =
        engine.dispatch_with_report(&IncomingMessage::new("switch/3/state", "0"));

    assert!(dispatched.is_empty());
    assert_eq!(report.failed, 1);
}

#[test]
fn test_unconvertible_payload_drops_only_that_rule() {
    let engine = engine();
    let out = records(&engine, IncomingMessage::new("sensors/kitchen/temp", "21.5"));

    // "21.5" is not an int for the second rule
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].fields["value"], FieldValue::Float(21.5));
}

#[test]
fn test_json_extraction_and_multi_capture() {
    let engine = engine();
    let out = records(
        &engine,
        IncomingMessage::new("meter/floor1/main", r#"{"power": 120, "phases": ["1.5", 2]}"#),
    );

    assert_eq!(out.len(), 1);
    let record = &out[0];
    assert_eq!(record.tags["path"], "floor1/main");
    assert_eq!(record.fields["power"], FieldValue::Integer(120));
    assert_eq!(record.fields["phase"], FieldValue::Float(1.5));
    assert!(!record.fields.contains_key("payload"));
}

#[test]
fn test_unsubscribed_topic_yields_nothing() {
    let engine = engine();
    assert!(records(&engine, IncomingMessage::new("garage/door", "open")).is_empty());
    assert!(records(&engine, IncomingMessage::new("sensors/kitchen", "1")).is_empty());
}

// ============================================================================
// Line protocol
// ============================================================================

#[test]
fn test_records_render_as_line_protocol() {
    let engine = engine();
    let formatter = LineProtocolFormatter::new();

    let out = records(
        &engine,
        IncomingMessage::new("meter/floor1/main", r#"{"power": 120, "phases": [1.5]}"#),
    );
    assert_eq!(
        formatter.format(&out[0]).unwrap(),
        "meter,path=floor1/main phase=1.5,power=120i"
    );

    let out = records(&engine, IncomingMessage::new("sensors/hall/temp", "19"));
    assert_eq!(
        formatter.format_batch(&out).unwrap(),
        "environment,room=hall,sensor=temp,site=home calibrated=true,value=19\n\
         temp location=\"hall\",payload=19i"
    );
}
