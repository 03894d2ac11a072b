//! Rule engine - message to write record conversion
//!
//! For each inbound message the engine selects the rule groups whose
//! subscription filter matches the topic, re-parses the topic with every
//! rule of those groups and builds one [`WriteRecord`] per accepting rule.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::payload::{PayloadConverter, PayloadType};
use super::record::{FieldValue, WriteRecord};
use super::rules::{PayloadConfig, Rule, RuleSet};
use crate::error::RecordError;
use crate::sink::RecordSink;
use crate::source::IncomingMessage;
use crate::topic::{matches_subscription, Captures};

/// A record together with the rule that produced it
#[derive(Debug, Clone)]
pub struct Dispatched<'a> {
    pub rule: &'a Rule,
    pub record: WriteRecord,
}

/// Per-message dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Records built
    pub records: usize,
    /// Rules skipped because the message was retained
    pub skipped_retained: usize,
    /// Rules whose token rules rejected the topic
    pub rejected: usize,
    /// Rules whose record could not be built
    pub failed: usize,
}

/// Outcome of handing records to a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub written: usize,
    pub failed: usize,
    /// Records of rules with `disable_write`
    pub suppressed: usize,
}

impl WriteSummary {
    /// Count one write outcome
    pub fn add(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::Failed => self.failed += 1,
            WriteOutcome::Suppressed => self.suppressed += 1,
        }
    }
}

/// Result of writing one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Failed,
    /// The rule has `disable_write`
    Suppressed,
}

/// Rule engine
///
/// Holds the compiled rule set; read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: RuleSet,
    converter: PayloadConverter,
}

impl RuleEngine {
    /// Create a new RuleEngine with the given rules
    ///
    /// # Example
    ///
    /// ```ignore
    /// use mqtt2influx::transformer::{RuleEngine, RuleSet};
    ///
    /// let engine = RuleEngine::new(RuleSet::new());
    /// ```
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            converter: PayloadConverter::new(),
        }
    }

    /// Get a reference to the rule set
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Build the records for one message
    pub fn dispatch<'a>(&'a self, msg: &IncomingMessage) -> Vec<Dispatched<'a>> {
        self.dispatch_with_report(msg).0
    }

    /// Build the records for one message and report what was skipped
    pub fn dispatch_with_report<'a>(
        &'a self,
        msg: &IncomingMessage,
    ) -> (Vec<Dispatched<'a>>, DispatchReport) {
        let mut report = DispatchReport::default();
        let mut records = Vec::new();

        let groups = self
            .rules
            .groups()
            .iter()
            .filter(|group| matches_subscription(group.normalized(), &msg.topic));

        for group in groups {
            for rule in group.rules() {
                if msg.retain && !rule.retain {
                    report.skipped_retained += 1;
                    continue;
                }

                let Some(captures) = rule.pattern.parse(&msg.topic) else {
                    debug!(rule = %rule.topic(), topic = %msg.topic, "Token rule rejected topic");
                    report.rejected += 1;
                    continue;
                };

                match self.build_record(rule, msg, &captures) {
                    Ok(record) => {
                        if record.measurement.is_none() {
                            error!(
                                rule = %rule.topic(),
                                topic = %msg.topic,
                                "No measurement configured for rule"
                            );
                        }
                        records.push(Dispatched { rule, record });
                    }
                    Err(e) => {
                        error!(
                            rule = %rule.topic(),
                            topic = %msg.topic,
                            error = %e,
                            "Failed to build record"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        if records.len() > 1 {
            warn!(
                topic = %msg.topic,
                count = records.len(),
                "Message handled multiple times"
            );
        }

        report.records = records.len();
        (records, report)
    }

    /// Records for one message, without rule references
    pub fn records(&self, msg: &IncomingMessage) -> Vec<WriteRecord> {
        self.dispatch(msg).into_iter().map(|d| d.record).collect()
    }

    /// Build the record of one rule from already-parsed captures
    ///
    /// Later steps overwrite keys written by earlier ones: payload, static
    /// fields and tags, literal measurement, then captures.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be converted or a value map has no
    /// entry for a captured value.
    pub fn build_record(
        &self,
        rule: &Rule,
        msg: &IncomingMessage,
        captures: &Captures,
    ) -> Result<WriteRecord, RecordError> {
        let mut record = WriteRecord::new();

        if let Some(payload) = rule.payload.as_ref().filter(|p| p.is_used()) {
            self.apply_payload(payload, &msg.payload, &mut record)?;
        }

        record
            .fields
            .extend(rule.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        record
            .tags
            .extend(rule.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(measurement) = &rule.measurement {
            record.measurement = Some(measurement.clone());
        }

        for (name, value) in captures.iter() {
            let Some(token) = rule.tokens.get(name) else {
                continue;
            };
            let text = value.to_string();

            if token.is_field {
                record.fields.insert(
                    token.field_key(name).to_string(),
                    FieldValue::String(text.clone()),
                );
            }
            if !token.field_map.is_empty() {
                let mapped = token.field_map.get(&text).ok_or_else(|| RecordError::MapLookup {
                    map: "field_map",
                    token: name.to_string(),
                    value: text.clone(),
                })?;
                record.fields.insert(
                    token.field_key(name).to_string(),
                    FieldValue::String(mapped.clone()),
                );
            }

            if token.is_tag {
                record
                    .tags
                    .insert(token.tag_key(name).to_string(), text.clone());
            }
            if !token.tag_map.is_empty() {
                let mapped = token.tag_map.get(&text).ok_or_else(|| RecordError::MapLookup {
                    map: "tag_map",
                    token: name.to_string(),
                    value: text.clone(),
                })?;
                record
                    .tags
                    .insert(token.tag_key(name).to_string(), mapped.clone());
            }

            if token.is_measurement {
                record.measurement = Some(text);
            }
        }

        Ok(record)
    }

    fn apply_payload(
        &self,
        payload: &PayloadConfig,
        bytes: &[u8],
        record: &mut WriteRecord,
    ) -> Result<(), RecordError> {
        let raw = self.converter.decode(bytes)?;

        if !payload.extract.is_empty() {
            match serde_json::from_str::<Value>(&raw) {
                Ok(document) => {
                    for extract in &payload.extract {
                        let payload_type = extract
                            .explicit_type
                            .as_deref()
                            .map(str::parse::<PayloadType>)
                            .transpose()?;
                        let value =
                            self.converter
                                .extract(&document, &extract.json_path, payload_type)?;
                        record.fields.insert(extract.field.clone(), value);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Payload is not JSON, skipping extraction");
                }
            }
        }

        if payload.is_field {
            let value = self.converter.convert(
                &raw,
                payload.explicit_type.as_deref(),
                payload.json_path.as_deref(),
            )?;
            record.fields.insert(payload.name.clone(), value);
        }

        Ok(())
    }

    /// Hand one dispatched record to a sink
    ///
    /// A failed write is logged and reported, never propagated.
    pub async fn write_one<S: RecordSink>(
        &self,
        topic: &str,
        dispatched: &Dispatched<'_>,
        sink: &S,
    ) -> WriteOutcome {
        let Dispatched { rule, record } = dispatched;

        if rule.disable_write {
            info!(rule = %rule.topic(), topic = %topic, "Not writing");
            return WriteOutcome::Suppressed;
        }

        match sink.write(record).await {
            Ok(()) => WriteOutcome::Written,
            Err(e) => {
                error!(
                    rule = %rule.topic(),
                    topic = %topic,
                    measurement = ?record.measurement,
                    error = %e,
                    "Failed to write record"
                );
                WriteOutcome::Failed
            }
        }
    }

    /// Hand dispatched records to a sink in rule order
    ///
    /// A failed write does not stop the remaining records.
    pub async fn write_records<S: RecordSink>(
        &self,
        topic: &str,
        dispatched: &[Dispatched<'_>],
        sink: &S,
    ) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for item in dispatched {
            summary.add(self.write_one(topic, item, sink).await);
        }
        summary
    }

    /// Dispatch one message and write its records
    pub async fn process<S: RecordSink>(&self, msg: &IncomingMessage, sink: &S) -> WriteSummary {
        let dispatched = self.dispatch(msg);
        self.write_records(&msg.topic, &dispatched, sink).await
    }
}
