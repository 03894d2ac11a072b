//! Rule definitions binding topic patterns to record construction
//!
//! A [`Rule`] pairs one [`TopicPattern`] with the policy used to build a
//! [`WriteRecord`](super::WriteRecord) from a matching message: which
//! captures become fields, tags or the measurement, how the payload is
//! coerced, and which static values are attached.
//!
//! Rules are grouped in a [`RuleSet`] by the normalized wildcard form of
//! their pattern. Each group corresponds to one broker subscription.
//!
//! # Example
//!
//! ```ignore
//! use mqtt2influx::transformer::rules::{Rule, RuleSet, TokenConfig};
//!
//! let rule = Rule::new("home/+room/temperature")?
//!     .with_measurement("temperature")
//!     .with_token("room", TokenConfig::tag());
//!
//! let rules = RuleSet::from_rules(vec![rule]);
//! assert_eq!(rules.subscriptions().collect::<Vec<_>>(), vec!["home/+/temperature"]);
//! ```

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{error, warn};

use super::payload::PayloadType;
use super::record::FieldValue;
use crate::config::{ConfigValue, ExtractRuleConfig, PayloadRuleConfig, RuleConfig, TokenRuleConfig};
use crate::error::PatternError;
use crate::topic::{is_valid_filter, TopicPattern};

/// Errors raised while binding a rule definition
#[derive(Error, Debug)]
pub enum RuleError {
    /// The definition has no `topic`
    #[error("Rule #{index} has no topic")]
    MissingTopic { index: usize },

    /// The pattern or one of its token rules does not compile
    #[error("Rule #{index} is invalid: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: PatternError,
    },

    /// The normalized pattern cannot be subscribed to
    #[error("Rule #{index} normalizes to invalid subscription filter '{filter}'")]
    InvalidSubscription { index: usize, filter: String },
}

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// How one named capture contributes to the record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenConfig {
    /// Field key override, defaults to the token name
    pub field_name: Option<String>,
    /// Tag key override, defaults to the token name
    pub tag_name: Option<String>,
    pub is_field: bool,
    pub is_tag: bool,
    /// Captured value → field value; applied whenever non-empty
    pub field_map: HashMap<String, String>,
    /// Captured value → tag value; applied whenever non-empty
    pub tag_map: HashMap<String, String>,
    pub is_measurement: bool,
}

impl TokenConfig {
    /// Capture stored as a field under the token name
    pub fn field() -> Self {
        Self {
            is_field: true,
            ..Self::default()
        }
    }

    /// Capture stored as a tag under the token name
    pub fn tag() -> Self {
        Self {
            is_tag: true,
            ..Self::default()
        }
    }

    /// Capture used as the measurement
    pub fn measurement() -> Self {
        Self {
            is_measurement: true,
            ..Self::default()
        }
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn with_tag_name(mut self, name: impl Into<String>) -> Self {
        self.tag_name = Some(name.into());
        self
    }

    /// Add a field map entry
    pub fn with_field_map(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.field_map.insert(from.into(), to.into());
        self
    }

    /// Add a tag map entry
    pub fn with_tag_map(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.tag_map.insert(from.into(), to.into());
        self
    }

    /// Key used when writing this capture as a field
    pub fn field_key<'a>(&'a self, token: &'a str) -> &'a str {
        self.field_name.as_deref().unwrap_or(token)
    }

    /// Key used when writing this capture as a tag
    pub fn tag_key<'a>(&'a self, token: &'a str) -> &'a str {
        self.tag_name.as_deref().unwrap_or(token)
    }

    fn from_config(config: &TokenRuleConfig) -> Self {
        Self {
            field_name: config.field_name.clone(),
            tag_name: config.tag_name.clone(),
            is_field: config.field,
            is_tag: config.tag,
            field_map: stringify_map(&config.field_map),
            tag_map: stringify_map(&config.tag_map),
            is_measurement: config.measurement,
        }
    }
}

/// One declarative JSON extraction from the payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractConfig {
    /// Target field key
    pub field: String,
    /// Comma-separated path of keys and indices
    pub json_path: String,
    /// Type applied to the leaf, JSON type kept when absent
    pub explicit_type: Option<String>,
}

impl ExtractConfig {
    fn from_config(field: &str, config: &ExtractRuleConfig) -> Self {
        Self {
            field: field.to_string(),
            json_path: config.json.clone(),
            explicit_type: config.payload_type.clone(),
        }
    }
}

/// How the payload contributes to the record
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadConfig {
    /// Field key for the payload value
    pub name: String,
    pub is_field: bool,
    /// Type name as configured; unknown names fail at conversion time
    pub explicit_type: Option<String>,
    pub json_path: Option<String>,
    pub extract: Vec<ExtractConfig>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            name: "payload".to_string(),
            is_field: false,
            explicit_type: None,
            json_path: None,
            extract: Vec::new(),
        }
    }
}

impl PayloadConfig {
    /// Payload stored as a field named `payload`
    pub fn field() -> Self {
        Self {
            is_field: true,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_type(mut self, payload_type: impl Into<String>) -> Self {
        self.explicit_type = Some(payload_type.into());
        self
    }

    pub fn with_json_path(mut self, path: impl Into<String>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// Add a JSON extraction into `field`
    pub fn with_extract(
        mut self,
        field: impl Into<String>,
        json_path: impl Into<String>,
        explicit_type: Option<&str>,
    ) -> Self {
        self.extract.push(ExtractConfig {
            field: field.into(),
            json_path: json_path.into(),
            explicit_type: explicit_type.map(str::to_string),
        });
        self
    }

    /// Whether any part of the payload is consumed
    pub fn is_used(&self) -> bool {
        self.is_field || !self.extract.is_empty()
    }

    fn from_config(config: &PayloadRuleConfig) -> Self {
        Self {
            name: config.name.clone(),
            is_field: config.field,
            explicit_type: config.payload_type.clone(),
            json_path: config.json.clone(),
            extract: config
                .extract
                .iter()
                .map(|(field, extract)| ExtractConfig::from_config(field, extract))
                .collect(),
        }
    }
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Topic pattern including token validators
    pub pattern: TopicPattern,
    /// Per-capture configuration keyed by token name
    pub tokens: HashMap<String, TokenConfig>,
    pub payload: Option<PayloadConfig>,
    /// Static fields
    pub fields: BTreeMap<String, FieldValue>,
    /// Static tags
    pub tags: BTreeMap<String, String>,
    /// Literal measurement
    pub measurement: Option<String>,
    /// Accept retained messages
    pub retain: bool,
    /// Build records without writing them
    pub disable_write: bool,
}

impl Rule {
    /// Create a rule for a topic pattern with no record policy
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn new(topic: impl Into<String>) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: TopicPattern::compile(topic)?,
            tokens: HashMap::new(),
            payload: None,
            fields: BTreeMap::new(),
            tags: BTreeMap::new(),
            measurement: None,
            retain: false,
            disable_write: false,
        })
    }

    /// The pattern as written
    pub fn topic(&self) -> &str {
        self.pattern.topic()
    }

    /// Subscription key of this rule
    pub fn normalized(&self) -> &str {
        self.pattern.normalized()
    }

    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = Some(measurement.into());
        self
    }

    pub fn with_token(mut self, name: impl Into<String>, config: TokenConfig) -> Self {
        self.tokens.insert(name.into(), config);
        self
    }

    /// Register a validator rule for a capture
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is not a valid regex.
    pub fn with_token_rule(mut self, name: &str, rule: &str) -> Result<Self, PatternError> {
        self.pattern.add_validator(name, rule)?;
        Ok(self)
    }

    pub fn with_payload(mut self, payload: PayloadConfig) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add a static field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a static tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_disable_write(mut self, disable_write: bool) -> Self {
        self.disable_write = disable_write;
        self
    }

    /// Bind one `rules` entry
    ///
    /// `index` is the position in the configuration list and only appears in
    /// errors and logs.
    pub fn from_config(index: usize, config: &RuleConfig) -> RuleResult<Self> {
        let topic = config
            .topic
            .as_deref()
            .ok_or(RuleError::MissingTopic { index })?;

        let mut rule =
            Rule::new(topic).map_err(|source| RuleError::Pattern { index, source })?;

        if !is_valid_filter(rule.normalized()) {
            return Err(RuleError::InvalidSubscription {
                index,
                filter: rule.normalized().to_string(),
            });
        }

        rule.retain = config.retain;
        rule.disable_write = config.disable_write;
        rule.measurement = config.measurement.as_ref().map(ConfigValue::to_string);
        rule.payload = config.payload.as_ref().map(PayloadConfig::from_config);

        if let Some(fields) = &config.fields {
            rule.fields = fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_field_value()))
                .collect();
        }

        if let Some(tags) = &config.tags {
            rule.tags = tags.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        }

        for (name, token) in config.tokens.iter().flatten() {
            if let Some(validator) = &token.rule {
                rule.pattern
                    .add_validator(name.as_str(), validator)
                    .map_err(|source| RuleError::Pattern { index, source })?;
            }
            rule.tokens
                .insert(name.clone(), TokenConfig::from_config(token));
        }

        rule.warn_on_suspicious_config();
        Ok(rule)
    }

    fn warn_on_suspicious_config(&self) {
        let names: Vec<&str> = self.pattern.capture_names().collect();
        for token in self.tokens.keys() {
            if !names.contains(&token.as_str()) {
                warn!(
                    rule = %self.topic(),
                    token = %token,
                    "Token is configured but not captured by the topic pattern"
                );
            }
        }

        let Some(payload) = &self.payload else {
            return;
        };

        let is_json = payload
            .explicit_type
            .as_deref()
            .and_then(|t| t.parse::<PayloadType>().ok())
            == Some(PayloadType::Json);
        if payload.is_field && is_json && payload.json_path.is_none() {
            warn!(
                rule = %self.topic(),
                "Payload type json has no json path, conversion will fail"
            );
        }

        let types = payload
            .explicit_type
            .iter()
            .chain(payload.extract.iter().filter_map(|e| e.explicit_type.as_ref()));
        for payload_type in types {
            if payload_type.parse::<PayloadType>().is_err() {
                warn!(
                    rule = %self.topic(),
                    payload_type = %payload_type,
                    "Unknown payload type, conversion will fail"
                );
            }
        }
    }
}

/// Rules sharing one normalized pattern
#[derive(Debug, Clone)]
pub struct RuleGroup {
    normalized: String,
    rules: Vec<Rule>,
}

impl RuleGroup {
    /// Subscription filter of this group
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Rules in configuration order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Rules grouped by normalized pattern
///
/// Groups keep the order in which their first rule was added; rules inside a
/// group keep configuration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    groups: Vec<RuleGroup>,
    index: HashMap<String, usize>,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a rule set from a list of rules
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        rules.into_iter().collect()
    }

    /// Bind every `rules` entry, skipping the ones that cannot be compiled
    ///
    /// Skipped rules are logged at error level; loading continues with the
    /// remaining entries.
    pub fn from_config(configs: &[RuleConfig]) -> Self {
        let mut set = Self::new();

        for (index, config) in configs.iter().enumerate() {
            match Rule::from_config(index, config) {
                Ok(rule) => set.add(rule),
                Err(e) => {
                    error!(rule_index = index, error = %e, "Skipping rule");
                }
            }
        }

        set
    }

    /// Add a rule to its normalized group
    pub fn add(&mut self, rule: Rule) {
        match self.index.get(rule.normalized()) {
            Some(&position) => self.groups[position].rules.push(rule),
            None => {
                let normalized = rule.normalized().to_string();
                self.index.insert(normalized.clone(), self.groups.len());
                self.groups.push(RuleGroup {
                    normalized,
                    rules: vec![rule],
                });
            }
        }
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }

    /// Check if the rule set is empty
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Rules registered under one normalized pattern
    pub fn group(&self, normalized: &str) -> Option<&RuleGroup> {
        self.index.get(normalized).map(|&i| &self.groups[i])
    }

    /// Distinct subscription filters in first-seen order
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.normalized.as_str())
    }

    /// Iterate over all rules, group by group
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.groups.iter().flat_map(|g| g.rules.iter())
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.add(rule);
        }
        set
    }
}

fn stringify_map(map: &BTreeMap<String, ConfigValue>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
}
