//! Topic pattern compiler and matcher
//!
//! A pattern is a slash-delimited topic where each segment is either a
//! literal, a single-level wildcard `+name` or a multi-level wildcard `#name`.
//! The name is optional; unnamed wildcards match but are not captured.
//!
//! # Example
//!
//! ```ignore
//! use mqtt2influx::topic::TopicPattern;
//!
//! let pattern = TopicPattern::compile("home/+room/#rest")?;
//! assert_eq!(pattern.normalized(), "home/+/#");
//!
//! let captures = pattern.parse("home/kitchen/sensor/temp").unwrap();
//! assert_eq!(captures.get("room").unwrap().to_string(), "kitchen");
//! ```

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::error::PatternError;

const SINGLE_PIECE: &str = "([^/#+]+/)";
const SINGLE_LAST: &str = "([^/#+]+/?)";
const MULTI_PIECE: &str = "((?:[^/#+]+/)*)";
const MULTI_LAST: &str = "((?:[^/#+]+/?)*)";

/// One `/`-delimited segment of a topic pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Matches its text exactly
    Literal(String),
    /// Matches exactly one segment
    Single(String),
    /// Matches zero or more trailing segments
    Multi(String),
}

impl Token {
    fn parse(segment: &str) -> Self {
        if let Some(name) = segment.strip_prefix('+') {
            Token::Single(name.to_string())
        } else if let Some(name) = segment.strip_prefix('#') {
            Token::Multi(name.to_string())
        } else {
            Token::Literal(segment.to_string())
        }
    }

    /// Capture name, `None` for literals and anonymous wildcards
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Literal(_) => None,
            Token::Single(name) | Token::Multi(name) if name.is_empty() => None,
            Token::Single(name) | Token::Multi(name) => Some(name.as_str()),
        }
    }

    /// Whether the token owns a capturing group in the matcher
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }

    /// Regex fragment for a token followed by more segments
    fn piece(&self) -> String {
        match self {
            Token::Literal(text) => format!("{}/", regex::escape(text)),
            Token::Single(_) => SINGLE_PIECE.to_string(),
            Token::Multi(_) => MULTI_PIECE.to_string(),
        }
    }

    /// Regex fragment for the final emitted token
    fn last(&self) -> String {
        match self {
            Token::Literal(text) => format!("{}/?", regex::escape(text)),
            Token::Single(_) => SINGLE_LAST.to_string(),
            Token::Multi(_) => MULTI_LAST.to_string(),
        }
    }

    fn normalized(&self) -> &str {
        match self {
            Token::Literal(text) => text.as_str(),
            Token::Single(_) => "+",
            Token::Multi(_) => "#",
        }
    }
}

/// Constraint a named single-level capture must satisfy
///
/// The rule is anchored at the start of the captured segment only, so
/// `temp` accepts `temperature`; use `temp$` for an exact match.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    rule: String,
    regex: Regex,
}

impl TokenValidator {
    /// Compile a validator rule
    pub fn new(rule: impl Into<String>) -> Result<Self, regex::Error> {
        let rule = rule.into();
        let regex = Regex::new(&format!("^(?:{})", rule))?;
        Ok(Self { rule, regex })
    }

    /// The rule as written in configuration
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Value captured by a named wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    /// Captured by `+name`
    Single(String),
    /// Captured by `#name`, one element per segment
    Multi(Vec<String>),
}

impl TokenValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            TokenValue::Single(s) => Some(s.as_str()),
            TokenValue::Multi(_) => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[String]> {
        match self {
            TokenValue::Single(_) => None,
            TokenValue::Multi(parts) => Some(parts.as_slice()),
        }
    }
}

/// Multi values render joined with `/`
impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Single(s) => f.write_str(s),
            TokenValue::Multi(parts) => f.write_str(&parts.join("/")),
        }
    }
}

impl From<&str> for TokenValue {
    fn from(value: &str) -> Self {
        TokenValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for TokenValue {
    fn from(values: Vec<&str>) -> Self {
        TokenValue::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// Named captures in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    entries: Vec<(String, TokenValue)>,
}

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a capture; a repeated name keeps its position and takes the new value
    pub fn insert(&mut self, name: impl Into<String>, value: TokenValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TokenValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<N: Into<String>, V: Into<TokenValue>> FromIterator<(N, V)> for Captures {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut captures = Captures::new();
        for (name, value) in iter {
            captures.insert(name, value.into());
        }
        captures
    }
}

/// Compiled topic pattern
///
/// Tokens, normalized form and matcher are fixed at compile time. Validators
/// can be added or cleared afterwards; they never affect the normalized form.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    topic: String,
    tokens: Vec<Token>,
    normalized: String,
    regex: Regex,
    validators: HashMap<String, TokenValidator>,
}

impl TopicPattern {
    /// Compile a pattern string
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidPattern` if the generated matcher does
    /// not compile.
    pub fn compile(topic: impl Into<String>) -> Result<Self, PatternError> {
        let topic = topic.into();
        let tokens: Vec<Token> = topic.split('/').map(Token::parse).collect();

        let normalized = tokens
            .iter()
            .map(Token::normalized)
            .collect::<Vec<_>>()
            .join("/");

        let source = build_matcher(&tokens);
        let regex = Regex::new(&source).map_err(|e| PatternError::InvalidPattern {
            pattern: topic.clone(),
            source: e,
        })?;

        Ok(Self {
            topic,
            tokens,
            normalized,
            regex,
            validators: HashMap::new(),
        })
    }

    /// The pattern as written
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Wildcard shape of the pattern, used as the subscription key
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Names of all named wildcards in declaration order
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(Token::name)
    }

    pub fn validators(&self) -> &HashMap<String, TokenValidator> {
        &self.validators
    }

    /// Register a validator rule for a capture name, replacing any previous one
    pub fn add_validator(
        &mut self,
        token: impl Into<String>,
        rule: &str,
    ) -> Result<(), PatternError> {
        let token = token.into();
        let validator =
            TokenValidator::new(rule).map_err(|e| PatternError::InvalidValidator {
                token: token.clone(),
                rule: rule.to_string(),
                source: e,
            })?;
        self.validators.insert(token, validator);
        Ok(())
    }

    pub fn clear_validators(&mut self) {
        self.validators.clear();
    }

    /// Structural match only, validators are not consulted
    pub fn is_match(&self, topic: &str) -> bool {
        self.regex.is_match(topic)
    }

    /// Match a topic and extract named captures
    ///
    /// Returns an empty `Captures` when the topic does not match structurally
    /// and `None` when it matches but a validator rejects a capture.
    pub fn parse(&self, topic: &str) -> Option<Captures> {
        let mut result = Captures::new();

        let Some(caps) = self.regex.captures(topic) else {
            return Some(result);
        };

        let wildcards = self.tokens.iter().filter(|t| t.is_wildcard());
        for (index, token) in wildcards.enumerate() {
            let raw = caps.get(index + 1).map(|m| m.as_str()).unwrap_or("");

            let Some(name) = token.name() else {
                continue;
            };

            let value = match token {
                Token::Multi(_) => {
                    let mut parts: Vec<String> = raw.split('/').map(str::to_string).collect();
                    if parts.last().is_some_and(|p| p.is_empty()) {
                        parts.pop();
                    }
                    TokenValue::Multi(parts)
                }
                _ => {
                    let value = raw.strip_suffix('/').unwrap_or(raw);
                    if let Some(validator) = self.validators.get(name) {
                        if !validator.is_match(value) {
                            tracing::trace!(
                                token = %name,
                                value = %value,
                                rule = %validator.rule(),
                                "Capture rejected by token rule"
                            );
                            return None;
                        }
                    }
                    TokenValue::Single(value.to_string())
                }
            };

            result.insert(name, value);
        }

        Some(result)
    }
}

/// Build the anchored matcher source for a token list
///
/// The last token, and the one before it when the last is a multi-level
/// wildcard, use the form without a mandatory trailing slash.
fn build_matcher(tokens: &[Token]) -> String {
    let count = tokens.len();
    let ends_with_multi = matches!(tokens.last(), Some(Token::Multi(_)));

    let mut source = String::from("^");
    for (index, token) in tokens.iter().enumerate() {
        let is_last = index + 1 == count;
        let before_multi = ends_with_multi && index + 2 == count;
        if is_last || before_multi {
            source.push_str(&token.last());
        } else {
            source.push_str(&token.piece());
        }
    }
    source.push('$');
    source
}
